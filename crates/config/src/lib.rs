//! Configuration management for the campus guide
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (`CAMPUS_GUIDE__` prefix, `__` separator)
//! - Compiled defaults

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AsrConfig, EmbeddingProvider, EmbeddingSettings, LlmProvider, LlmSettings,
    ObservabilityConfig, PipelineSettings, RagConfig, RerankerProvider, RerankerSettings,
    RuntimeEnvironment, ServerConfig, SessionConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for campus_guide_core::Error {
    fn from(err: ConfigError) -> Self {
        campus_guide_core::Error::Config(err.to_string())
    }
}
