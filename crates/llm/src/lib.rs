//! LLM integration for the campus guide
//!
//! Features:
//! - Text-completion backends (Hugging Face TGI, Ollama, OpenAI-compatible)
//! - Retry with exponential backoff on transient failures
//! - Llama 3 chat-template prompt building
//! - Backend factory driven by settings
//! - Tolerant JSON extraction from model output

pub mod backend;
pub mod factory;
pub mod output;
pub mod prompt;

pub use backend::{LlmConfig, OllamaBackend, OpenAiBackend, TgiBackend};
pub use factory::LlmFactory;
pub use output::{parse_json, strip_code_fences, ModelOutputError};
pub use prompt::{clean_response, Llama3PromptBuilder};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Network errors, 5xx responses and timeouts are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for campus_guide_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => campus_guide_core::Error::Timeout("LLM request".to_string()),
            other => campus_guide_core::Error::Llm(other.to_string()),
        }
    }
}
