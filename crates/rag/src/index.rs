//! Embedding index
//!
//! Flat in-memory index over all building document texts, built once at
//! startup. The building table is small enough that an exhaustive cosine
//! scan is faster than maintaining an ANN structure.

use crate::embeddings::Embedder;
use crate::RagError;

/// Cosine similarity of two vectors, 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Read-only vector index; entry `i` belongs to table row `i`
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    /// Embed every document text
    pub async fn build(embedder: &dyn Embedder, texts: &[String]) -> Result<Self, RagError> {
        let vectors = embedder.embed_documents(texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::Index(format!(
                "Embedded {} of {} documents",
                vectors.len(),
                texts.len()
            )));
        }
        tracing::debug!(
            embedder = embedder.name(),
            documents = vectors.len(),
            "Embedding index built"
        );
        Ok(Self { vectors })
    }

    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Self {
        Self { vectors }
    }

    /// Indices of the `k` most similar entries with their similarity,
    /// best first; ties keep index order
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_top_k_order_and_ties() {
        let index = EmbeddingIndex::from_vectors(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![0.7, 0.7],
        ]);
        let hits = index.top_k(&[1.0, 0.0], 3);
        let order: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 2, 3]);

        assert_eq!(index.top_k(&[1.0, 0.0], 10).len(), 4);
        assert!(index.top_k(&[1.0, 0.0], 0).is_empty());
    }

    #[tokio::test]
    async fn test_build_with_hash_embedder() {
        let embedder = HashEmbedder::new(64);
        let texts = vec!["Mensa am Adenauerring 01.12".to_string(), "Audimax 30.95".to_string()];
        let index = EmbeddingIndex::build(&embedder, &texts).await.unwrap();
        assert_eq!(index.len(), 2);

        let query = embedder.embed("Audimax");
        assert_eq!(index.top_k(&query, 1)[0].0, 1);
    }
}
