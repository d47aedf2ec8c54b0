//! Error types shared across the workspace
//!
//! Crate-local errors (`LlmError`, `RagError`, ...) convert into [`Error`] so
//! that pipeline code can propagate with `?`.

use thiserror::Error;

/// Result alias used by all core traits
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Language model backend unreachable or returned an error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding / reranking / record table failure
    #[error("Retrieval error: {0}")]
    Rag(String),

    /// Speech recognition service failure
    #[error("Speech recognition error: {0}")]
    Stt(String),

    /// Audio could not be converted into the recogniser's input format
    #[error("Audio conversion failed: {0}")]
    AudioConversion(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Model output could not be interpreted and no fallback applies
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures of an external model or recognition service.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Llm(_) | Error::Rag(_) | Error::Stt(_) | Error::Timeout(_)
        )
    }

    /// Short machine-readable kind, used for metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Llm(_) => "llm",
            Error::Rag(_) => "rag",
            Error::Stt(_) => "stt",
            Error::AudioConversion(_) => "audio_conversion",
            Error::SessionNotFound(_) => "session_not_found",
            Error::MalformedOutput(_) => "malformed_output",
            Error::Config(_) => "config",
            Error::Data(_) => "data",
            Error::Timeout(_) => "timeout",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Data(err.to_string())
    }
}
