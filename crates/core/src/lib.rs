//! Core traits and types for the campus guide
//!
//! This crate provides foundational types used across all other crates:
//! - Conversation and message types
//! - Retrieval result types (documents, routing decision, turn result)
//! - Capability traits for pluggable backends (LLM, retrieval, ASR)
//! - Error types

pub mod conversation;
pub mod document;
pub mod error;
pub mod llm_types;
pub mod traits;

pub use conversation::{Conversation, Message, Role};
pub use document::{FieldMap, PipelineResult, QueryType, RetrievedDocument};
pub use error::{Error, Result};
pub use llm_types::GenerationConfig;

pub use traits::{DocumentRetriever, LanguageModel, SpeechToText, StructuredQuery};
