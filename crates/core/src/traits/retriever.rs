//! Retrieval traits

use crate::{Result, RetrievedDocument};
use async_trait::async_trait;

/// Ranked retrieval of building records
///
/// Implementations:
/// - `RetrievalEngine` - identifier match followed by embedding search and cross-encoder rerank
///
/// Results hold at most `limit` documents with unique ids, best first.
/// An empty list is a valid outcome.
#[async_trait]
pub trait DocumentRetriever: Send + Sync + 'static {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedDocument>>;

    /// Retriever name for logging
    fn name(&self) -> &str;
}

/// Filtering and aggregation over the complete record table
///
/// Implementations:
/// - `StructuredQueryEngine` - LLM-planned filter/sort over the building table
///
/// Returned documents already carry only the columns relevant to the query.
#[async_trait]
pub trait StructuredQuery: Send + Sync + 'static {
    async fn query(&self, natural_language_query: &str) -> Result<Vec<RetrievedDocument>>;
}
