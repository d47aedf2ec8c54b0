//! Text Embeddings
//!
//! Dense vectors for the candidate search in front of the reranker.
//! Queries and documents are embedded separately so models with
//! asymmetric task prefixes can be used.

use async_trait::async_trait;
use std::sync::Arc;

use campus_guide_config::{EmbeddingProvider, EmbeddingSettings};

use crate::ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
use crate::RagError;

/// Embedding model
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed an indexed document
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed many documents
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_document(text).await?);
        }
        Ok(embeddings)
    }

    /// Embedding dimension
    fn dim(&self) -> usize;

    fn name(&self) -> &str;
}

/// Create the embedder selected in settings
pub fn create_embedder(settings: &EmbeddingSettings) -> Arc<dyn Embedder> {
    match settings.provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(settings.dim)),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            embedding_dim: settings.dim,
        })),
    }
}

/// Scale a vector to unit length in place
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Deterministic embedder over hashed character n-grams (no model required)
///
/// Each lowercase word contributes its padded character trigrams plus the
/// whole word, so names that share stems or identifiers land close together.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// FNV-1a, stable across platforms and releases
    fn hash(feature: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in feature.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    fn add(&self, embedding: &mut [f32], feature: &str, weight: f32) {
        let hash = Self::hash(feature);
        let index = (hash % self.dim as u64) as usize;
        // the top bit picks the sign, which keeps collisions from only adding up
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        embedding[index] += sign * weight;
    }

    /// Embed text synchronously
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dim];
        let lower = text.to_lowercase();

        for word in lower
            .split(|c: char| !c.is_alphanumeric() && c != '.')
            .map(|w| w.trim_matches('.'))
            .filter(|w| !w.is_empty())
        {
            self.add(&mut embedding, word, 2.0);

            let padded: Vec<char> = format!("#{}#", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add(&mut embedding, &gram, 1.0);
            }
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed(text))
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed(text))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "hash"
    }
}
