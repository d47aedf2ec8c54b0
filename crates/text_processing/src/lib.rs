//! Text processing for the campus guide
//!
//! - **ASR fix**: repair speech recognition noise before retrieval
//! - **Similarity**: edit-distance metrics for logging corrections
//! - **Translation**: LLM translation of generated answers

pub mod asr_fix;
pub mod similarity;
pub mod translation;

pub use asr_fix::{AsrCorrection, AsrErrorCorrector};
pub use similarity::{levenshtein_distance, similarity_ratio};
pub use translation::{LlmTranslator, Translator};
