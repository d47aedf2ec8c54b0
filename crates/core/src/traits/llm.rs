//! Language model trait

use crate::{GenerationConfig, Result};
use async_trait::async_trait;

/// Text completion interface
///
/// Implementations:
/// - `TgiBackend` - Hugging Face text-generation endpoint
/// - `OllamaBackend` - local Ollama server in raw prompt mode
/// - `OpenAiBackend` - OpenAI-compatible chat completions
///
/// Failures are returned as errors, never as empty strings.
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = LlmFactory::create(&settings.llm)?;
/// let text = llm.generate(&prompt, &GenerationConfig::new(0.1, 128)).await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Complete a fully rendered prompt
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    /// Check whether the backend answers at all
    async fn is_available(&self) -> bool {
        true
    }

    /// Model name for logging
    fn model_name(&self) -> &str;
}
