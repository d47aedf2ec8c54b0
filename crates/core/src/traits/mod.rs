//! Capability traits for the campus guide
//!
//! Every external collaborator sits behind one of these traits so concrete
//! backends are chosen at construction time and swapped for mocks in tests.
//!
//! ```text
//! Language Models:
//!   - LanguageModel: prompt string in, completion text out
//!
//! Retrieval:
//!   - DocumentRetriever: ranked building records for a query
//!   - StructuredQuery: filtering/aggregation over the whole record table
//!
//! Speech:
//!   - SpeechToText: audio file to transcript
//! ```

mod llm;
mod retriever;
mod speech;

pub use llm::LanguageModel;
pub use retriever::{DocumentRetriever, StructuredQuery};
pub use speech::SpeechToText;
