//! Cross-Encoder Reranking
//!
//! Scores (query, candidate) pairs jointly after the embedding search has
//! narrowed the table down to a few candidates.
//!
//! - `LexicalCrossEncoder`: weighted term overlap, no model files needed
//! - `OnnxCrossEncoder` (feature `onnx`): transformer cross-encoder such as
//!   `cross-encoder-mmarco-german-distilbert-base` exported to ONNX

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use campus_guide_config::{RerankerProvider, RerankerSettings};

use crate::RagError;

/// Joint relevance model for query/candidate pairs
pub trait CrossEncoder: Send + Sync {
    /// One score in [0, 1] per candidate, in candidate order
    fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RagError>;

    fn name(&self) -> &str;
}

/// Create the cross-encoder selected in settings
pub fn create_cross_encoder(
    settings: &RerankerSettings,
) -> Result<Arc<dyn CrossEncoder>, RagError> {
    match settings.provider {
        RerankerProvider::Lexical => Ok(Arc::new(LexicalCrossEncoder::new())),
        #[cfg(feature = "onnx")]
        RerankerProvider::Onnx => {
            let model_path = settings
                .model_path
                .as_deref()
                .ok_or_else(|| RagError::Model("reranker.model_path not set".to_string()))?;
            let tokenizer_path = settings.tokenizer_path.clone().unwrap_or_else(|| {
                Path::new(model_path)
                    .with_file_name("tokenizer.json")
                    .to_string_lossy()
                    .into_owned()
            });
            Ok(Arc::new(OnnxCrossEncoder::new(
                model_path,
                tokenizer_path,
                settings.max_length,
            )?))
        },
        #[cfg(not(feature = "onnx"))]
        RerankerProvider::Onnx => Err(RagError::Model(
            "ONNX reranker requested but the `onnx` feature is disabled".to_string(),
        )),
    }
}

/// Reranker usage counters
#[derive(Debug, Clone, Default)]
pub struct RerankerStats {
    /// Calls to `score`
    pub calls: usize,
    /// Pairs scored
    pub pairs: usize,
}

/// Term-overlap scorer with TF and specificity weighting
///
/// Used when no model is available. Matches whole terms and, for longer
/// terms, terms embedded in German compounds ("Bibliothek" in
/// "Fachbibliothek").
#[derive(Debug, Default)]
pub struct LexicalCrossEncoder {
    stats: Mutex<RerankerStats>,
}

impl LexicalCrossEncoder {
    /// Common stopwords for German and English
    const STOPWORDS: &'static [&'static str] = &[
        // German
        "der", "die", "das", "den", "dem", "des", "ein", "eine", "einen", "einem", "einer",
        "und", "oder", "ist", "sind", "wo", "wie", "was", "wann", "welche", "welcher",
        "welches", "ich", "du", "sie", "es", "wir", "ihr", "mir", "mich", "mein", "meine",
        "im", "in", "am", "an", "auf", "zu", "zum", "zur", "von", "vom", "mit", "für", "bei",
        "nach", "aus", "hat", "haben", "gibt", "finde", "suche", "bitte",
        // English
        "the", "a", "an", "is", "are", "where", "what", "when", "how", "which", "to", "of",
        "for", "on", "with", "at", "by", "from", "and", "or", "i", "me", "my", "find",
    ];

    /// Minimum length for a term to match inside a compound word
    const COMPOUND_MIN_LEN: usize = 5;

    pub fn new() -> Self {
        Self::default()
    }

    fn terms(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '.')
            .map(|w| w.trim_matches('.'))
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Score one pair
    ///
    /// Scoring formula:
    /// - Term frequency: sqrt(count in doc) for diminishing returns
    /// - Specificity: log(1 + term length) favors specific terms
    /// - Compound matches count half
    /// - Coverage bonus for documents matching more query terms
    pub fn score_pair(query: &str, document: &str) -> f32 {
        let stopwords: HashSet<&str> = Self::STOPWORDS.iter().copied().collect();

        let mut query_terms: Vec<String> = Self::terms(query)
            .into_iter()
            .filter(|t| !stopwords.contains(t.as_str()))
            .collect();
        let mut seen = HashSet::new();
        query_terms.retain(|t| seen.insert(t.clone()));

        if query_terms.is_empty() {
            return 0.0;
        }

        let doc_terms = Self::terms(document);
        let doc_len = doc_terms.len().max(1) as f32;

        let mut total_score = 0.0f32;
        let mut matched_terms = 0usize;

        for term in &query_terms {
            let exact = doc_terms.iter().filter(|w| *w == term).count() as f32;
            let compound = if term.chars().count() >= Self::COMPOUND_MIN_LEN {
                doc_terms
                    .iter()
                    .filter(|w| *w != term && w.contains(term.as_str()))
                    .count() as f32
            } else {
                0.0
            };

            let tf = exact + 0.5 * compound;
            if tf > 0.0 {
                matched_terms += 1;
                let specificity = (1.0 + term.chars().count() as f32).ln();
                let length_norm = 1.0 / (1.0 + (doc_len / 50.0).sqrt());
                total_score += tf.sqrt() * specificity * length_norm;
            }
        }

        let coverage = matched_terms as f32 / query_terms.len() as f32;
        let raw_score = total_score + coverage * 0.3;
        (raw_score / (raw_score + 1.0)).clamp(0.0, 1.0)
    }

    pub fn stats(&self) -> RerankerStats {
        self.stats.lock().clone()
    }
}

impl CrossEncoder for LexicalCrossEncoder {
    fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RagError> {
        {
            let mut stats = self.stats.lock();
            stats.calls += 1;
            stats.pairs += candidates.len();
        }
        Ok(candidates
            .iter()
            .map(|candidate| Self::score_pair(query, candidate))
            .collect())
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// ONNX cross-encoder
///
/// Expects a sequence-classification export with `input_ids` and
/// `attention_mask` inputs and a `logits` output. Single-logit models are
/// squashed with a sigmoid; two-class models use the softmax probability of
/// the relevant class.
#[cfg(feature = "onnx")]
pub struct OnnxCrossEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    stats: Mutex<RerankerStats>,
}

#[cfg(feature = "onnx")]
impl OnnxCrossEncoder {
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        max_length: usize,
    ) -> Result<Self, RagError> {
        let session = Session::builder()
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| RagError::Model(e.to_string()))?
            .commit_from_file(model_path.as_ref())
            .map_err(|e| RagError::Model(e.to_string()))?;

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| RagError::Model(e.to_string()))?;

        tracing::info!(
            model = %model_path.as_ref().display(),
            max_length,
            "ONNX cross-encoder loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: max_length.max(8),
            stats: Mutex::new(RerankerStats::default()),
        })
    }

    fn score_one(&self, query: &str, document: &str) -> Result<f32, RagError> {
        let encoding = self
            .tokenizer
            .encode((query, document), true)
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        let ids: Vec<i64> = encoding
            .get_ids()
            .iter()
            .take(self.max_length)
            .map(|&id| id as i64)
            .collect();
        let len = ids.len();

        let mut padded_ids = vec![0i64; self.max_length];
        let mut padded_mask = vec![0i64; self.max_length];
        padded_ids[..len].copy_from_slice(&ids);
        padded_mask[..len].fill(1);

        let input_ids = Array2::from_shape_vec((1, self.max_length), padded_ids)
            .map_err(|e| RagError::Reranker(e.to_string()))?;
        let attention = Array2::from_shape_vec((1, self.max_length), padded_mask)
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        let input_ids_tensor =
            Tensor::from_array(input_ids).map_err(|e| RagError::Model(e.to_string()))?;
        let attention_tensor =
            Tensor::from_array(attention).map_err(|e| RagError::Model(e.to_string()))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_tensor,
            ])
            .map_err(|e| RagError::Model(e.to_string()))?;

        let (_, logits) = outputs
            .get("logits")
            .ok_or_else(|| RagError::Model("Missing logits output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::Model(e.to_string()))?;

        Ok(relevance_from_logits(logits))
    }

    pub fn stats(&self) -> RerankerStats {
        self.stats.lock().clone()
    }
}

#[cfg(feature = "onnx")]
impl CrossEncoder for OnnxCrossEncoder {
    fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RagError> {
        {
            let mut stats = self.stats.lock();
            stats.calls += 1;
            stats.pairs += candidates.len();
        }
        candidates
            .iter()
            .map(|candidate| self.score_one(query, candidate))
            .collect()
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Map classifier logits to a relevance probability
pub fn relevance_from_logits(logits: &[f32]) -> f32 {
    match logits {
        [] => 0.0,
        [logit] => 1.0 / (1.0 + (-logit).exp()),
        [.., _] => {
            let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let exp_sum: f32 = logits.iter().map(|&x| (x - max).exp()).sum();
            (logits[1] - max).exp() / exp_sum
        },
    }
}
