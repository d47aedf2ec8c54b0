//! LLM Factory
//!
//! Creates the configured text-completion backend behind the core
//! `LanguageModel` trait, so pipeline components never name a provider.

use std::sync::Arc;

use campus_guide_config::{LlmProvider, LlmSettings};
use campus_guide_core::LanguageModel;

use crate::backend::{LlmConfig, OllamaBackend, OpenAiBackend, TgiBackend};
use crate::LlmError;

/// Factory for language model backends
pub struct LlmFactory;

impl LlmFactory {
    /// Create a backend from settings
    pub fn create(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>, LlmError> {
        let config = LlmConfig::from(settings);
        if config.endpoint.trim().is_empty() {
            return Err(LlmError::Configuration("LLM endpoint is empty".to_string()));
        }

        tracing::info!(
            provider = ?settings.provider,
            endpoint = %config.endpoint,
            model = %config.model,
            "Creating LLM backend"
        );

        let backend: Arc<dyn LanguageModel> = match settings.provider {
            LlmProvider::Tgi => Arc::new(TgiBackend::new(config)?),
            LlmProvider::Ollama => Arc::new(OllamaBackend::new(config)?),
            LlmProvider::OpenAi => Arc::new(OpenAiBackend::new(config)?),
        };
        Ok(backend)
    }

    /// Create a backend from `CAMPUS_GUIDE_LLM_*` variables, falling back
    /// to defaults. Used by tools that run without a config directory.
    pub fn from_env() -> Result<Arc<dyn LanguageModel>, LlmError> {
        let mut settings = LlmSettings::default();

        if let Ok(provider) = std::env::var("CAMPUS_GUIDE_LLM_PROVIDER") {
            settings.provider = match provider.to_lowercase().as_str() {
                "tgi" | "huggingface" => LlmProvider::Tgi,
                "ollama" | "local" => LlmProvider::Ollama,
                "openai" => LlmProvider::OpenAi,
                other => {
                    return Err(LlmError::Configuration(format!(
                        "Unknown LLM provider: {}",
                        other
                    )))
                }
            };
        }
        if let Ok(endpoint) = std::env::var("CAMPUS_GUIDE_LLM_ENDPOINT") {
            settings.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("CAMPUS_GUIDE_LLM_MODEL") {
            settings.model = model;
        }
        settings.api_key = std::env::var("CAMPUS_GUIDE_LLM_API_KEY").ok();

        Self::create(&settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_each_provider() {
        let mut settings = LlmSettings::default();
        let llm = LlmFactory::create(&settings).unwrap();
        assert_eq!(llm.model_name(), settings.model);

        settings.provider = LlmProvider::Ollama;
        settings.endpoint = "http://localhost:11434".to_string();
        assert!(LlmFactory::create(&settings).is_ok());

        settings.provider = LlmProvider::OpenAi;
        settings.endpoint = "http://localhost:8000/v1".to_string();
        assert!(LlmFactory::create(&settings).is_ok());
    }

    #[test]
    fn test_rejects_remote_openai_without_key() {
        let settings = LlmSettings {
            provider: LlmProvider::OpenAi,
            endpoint: "https://api.openai.com/v1".to_string(),
            ..LlmSettings::default()
        };
        assert!(matches!(
            LlmFactory::create(&settings),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_empty_endpoint() {
        let settings = LlmSettings {
            endpoint: "  ".to_string(),
            ..LlmSettings::default()
        };
        assert!(LlmFactory::create(&settings).is_err());
    }
}
