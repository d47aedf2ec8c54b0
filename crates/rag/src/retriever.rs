//! Retrieval Engine
//!
//! Two-phase building search:
//! 1. Identifier match: records named by a building number in the query,
//!    scored 1.0, most specific first.
//! 2. Semantic rerank for the remaining slots: embedding candidates
//!    (`slots * rerank_multiplier`) scored by a cross-encoder.
//!
//! Phase-one documents always precede phase-two documents.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use campus_guide_config::constants::rag;
use campus_guide_config::RagConfig;
use campus_guide_core::{DocumentRetriever, RetrievedDocument};

use crate::building_id::IdentifierMatcher;
use crate::embeddings::{create_embedder, Embedder};
use crate::index::EmbeddingIndex;
use crate::records::{normalize_text, RecordTable};
use crate::reranker::{create_cross_encoder, CrossEncoder};
use crate::RagError;

/// Retrieval engine configuration
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Embedding candidates fetched per open slot
    pub rerank_multiplier: usize,
    /// Upper bound for phase-two scores
    pub max_semantic_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rerank_multiplier: rag::RERANK_MULTIPLIER,
            max_semantic_score: rag::MAX_SEMANTIC_SCORE,
        }
    }
}

impl From<&RagConfig> for RetrievalConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            rerank_multiplier: config.rerank_multiplier.max(1),
            ..Self::default()
        }
    }
}

/// Hybrid building retriever; immutable once built
pub struct RetrievalEngine {
    table: Arc<RecordTable>,
    index: EmbeddingIndex,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn CrossEncoder>,
    matcher: IdentifierMatcher,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Embed every record and assemble the engine
    pub async fn build(
        table: Arc<RecordTable>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn CrossEncoder>,
        config: RetrievalConfig,
    ) -> Result<Self, RagError> {
        let start = Instant::now();
        let texts: Vec<String> = table.records().iter().map(|r| r.document_text()).collect();
        let index = EmbeddingIndex::build(embedder.as_ref(), &texts).await?;

        tracing::info!(
            records = table.len(),
            embedder = embedder.name(),
            reranker = reranker.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Retrieval engine ready"
        );

        Ok(Self {
            table,
            index,
            embedder,
            reranker,
            matcher: IdentifierMatcher,
            config,
        })
    }

    /// Load the dataset and models named in settings
    pub async fn from_settings(config: &RagConfig) -> Result<Self, RagError> {
        let table = RecordTable::load(
            Path::new(&config.data_path),
            &config.id_column,
            &config.name_column,
        )?;
        Self::build(
            Arc::new(table),
            create_embedder(&config.embedding),
            create_cross_encoder(&config.reranker)?,
            RetrievalConfig::from(config),
        )
        .await
    }

    /// Shared handle to the record table
    pub fn table(&self) -> Arc<RecordTable> {
        Arc::clone(&self.table)
    }

    /// Phase 1: records addressed by identifier tokens in the query
    pub fn retrieve_exact(&self, query: &str, limit: usize) -> Vec<RetrievedDocument> {
        self.matcher.find(&self.table, query, limit)
    }

    /// Phase 2: embedding candidates reranked by the cross-encoder
    ///
    /// Returns at most `slots` documents whose ids are not in `exclude`.
    pub async fn retrieve_semantic(
        &self,
        query: &str,
        exclude: &HashSet<String>,
        slots: usize,
    ) -> Result<Vec<RetrievedDocument>, RagError> {
        if slots == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let normalized = normalize_text(query);
        let query_vector = self.embedder.embed_query(&normalized).await?;
        let candidates = self
            .index
            .top_k(&query_vector, slots * self.config.rerank_multiplier);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<_> = candidates
            .iter()
            .filter_map(|(row, _)| self.table.get(*row))
            .collect();
        let texts: Vec<String> = records.iter().map(|r| r.document_text()).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let scores = self.reranker.score(&normalized, &text_refs)?;

        let mut reranked: Vec<_> = records.into_iter().zip(scores).collect();
        reranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut seen = exclude.clone();
        let documents: Vec<RetrievedDocument> = reranked
            .into_iter()
            .filter(|(record, _)| seen.insert(record.id.clone()))
            .take(slots)
            .map(|(record, score)| {
                let score = ((score * 1000.0).round() / 1000.0)
                    .clamp(0.0, self.config.max_semantic_score);
                record.to_document(score)
            })
            .collect();

        tracing::debug!(
            candidates = text_refs.len(),
            documents = documents.len(),
            "Semantic retrieval complete"
        );
        Ok(documents)
    }
}

#[async_trait]
impl DocumentRetriever for RetrievalEngine {
    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> campus_guide_core::Result<Vec<RetrievedDocument>> {
        let mut documents = self.retrieve_exact(query, limit);
        let exact = documents.len();

        if documents.len() < limit {
            let exclude: HashSet<String> = documents.iter().map(|d| d.id.clone()).collect();
            let semantic = self
                .retrieve_semantic(query, &exclude, limit - documents.len())
                .await?;
            documents.extend(semantic);
        }

        tracing::debug!(
            exact,
            semantic = documents.len() - exact,
            results = %documents
                .iter()
                .map(|d| format!("({:.3}) {}", d.relevance_score, d.id))
                .collect::<Vec<_>>()
                .join(", "),
            "Retrieved documents"
        );
        Ok(documents)
    }

    fn name(&self) -> &str {
        "retrieval_engine"
    }
}
