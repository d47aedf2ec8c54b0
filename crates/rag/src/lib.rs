//! Building record retrieval
//!
//! Features:
//! - Record table loading from CSV, JSON or YAML
//! - Exact building-identifier matching (`50.34`, `0412`)
//! - Dense candidate search over a precomputed embedding index
//! - Cross-encoder reranking (lexical fallback, ONNX model behind `onnx`)
//! - LLM-planned structured queries (filter, sort, distance to the user)
//! - Core `DocumentRetriever` / `StructuredQuery` implementations

pub mod building_id;
pub mod embeddings;
pub mod index;
pub mod ollama_embeddings;
pub mod records;
pub mod reranker;
pub mod retriever;
pub mod structured;

pub use building_id::{extract_identifier_tokens, IdentifierMatcher};
pub use embeddings::{create_embedder, Embedder, HashEmbedder};
pub use index::EmbeddingIndex;
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use records::{BuildingRecord, RecordTable};
pub use reranker::{create_cross_encoder, CrossEncoder, LexicalCrossEncoder};
#[cfg(feature = "onnx")]
pub use reranker::OnnxCrossEncoder;
pub use retriever::{RetrievalConfig, RetrievalEngine};
pub use structured::{QueryPlan, StructuredOptions, StructuredQueryEngine};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for campus_guide_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Data(msg) => campus_guide_core::Error::Data(msg),
            other => campus_guide_core::Error::Rag(other.to_string()),
        }
    }
}
