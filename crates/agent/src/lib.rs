//! Campus guide query pipeline
//!
//! Stages of one conversational turn:
//! - **ASR fix** (transcripts only, from `campus-guide-text-processing`)
//! - **Rephrasing**: resolve references against the dialogue
//! - **Routing**: retrieval engine or structured query engine
//! - **Field selection**: trim records to the fields the question needs
//! - **Answer generation** with the retrieved records as context
//! - **Link extraction** from the answer
//!
//! [`CampusPipeline`] runs them in order and owns the session's conversation.

pub mod field_selector;
pub mod links;
pub mod orchestrator;
pub mod prompts;
pub mod rephraser;
pub mod responder;
pub mod router;

#[cfg(test)]
mod test_support;

pub use field_selector::FieldSelector;
pub use orchestrator::{
    retrieval_query, CampusPipeline, InputKind, PipelineBuilder, StagePresets, TurnState,
};
pub use rephraser::QueryRephraser;
pub use responder::{render_documents, ResponseGenerator};
pub use router::QueryRouter;
