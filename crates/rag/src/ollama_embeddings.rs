//! Ollama Embeddings
//!
//! Uses Ollama's embedding API for generating dense vectors.
//!
//! ## nomic-embed-text task prefixes
//!
//! nomic-embed-text is trained with asymmetric prefixes: queries are sent as
//! `search_query: <text>` and indexed documents as `search_document: <text>`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use campus_guide_config::constants::{endpoints, rag};

use crate::embeddings::Embedder;
use crate::RagError;

pub const QUERY_PREFIX: &str = "search_query: ";
pub const DOCUMENT_PREFIX: &str = "search_document: ";

/// Documents per `/api/embed` request while building the index
const BATCH_SIZE: usize = 32;

/// Ollama embedding configuration
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Ollama API endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Embedding dimension
    pub embedding_dim: usize,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::OLLAMA_DEFAULT.to_string(),
            model: rag::EMBEDDING_MODEL.to_string(),
            embedding_dim: 768,
        }
    }
}

/// Request to Ollama embedding API
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

/// Response from Ollama embedding API
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: OllamaEmbeddingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Raw embedding without any formatting
    async fn embed_raw(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, RagError> {
        let expected = input.len();
        let request = EmbedRequest {
            model: &self.config.model,
            input,
        };

        let url = format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Connection(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Ollama embedding failed: {} - {}",
                status, text
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        if embed_response.embeddings.len() != expected {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                expected,
                embed_response.embeddings.len()
            )));
        }
        Ok(embed_response.embeddings)
    }

    async fn embed_one(&self, text: String) -> Result<Vec<f32>, RagError> {
        self.embed_raw(vec![text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    /// Get model name
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed_one(format!("{}{}", QUERY_PREFIX, text)).await
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed_one(format!("{}{}", DOCUMENT_PREFIX, text)).await
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let input = chunk
                .iter()
                .map(|t| format!("{}{}", DOCUMENT_PREFIX, t))
                .collect();
            embeddings.extend(self.embed_raw(input).await?);
        }
        Ok(embeddings)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
