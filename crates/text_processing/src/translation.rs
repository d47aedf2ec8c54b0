//! Translation
//!
//! Answers are generated in German; the HTTP layer offers translation into
//! the user's language through the same completion backend.

use async_trait::async_trait;
use std::sync::Arc;

use campus_guide_core::{GenerationConfig, LanguageModel, Result};
use campus_guide_llm::Llama3PromptBuilder;

pub const SYSTEM_PROMPT_TRANSLATOR: &str = "\
You are a translation engine for a campus information assistant.
Translate the text given by the user into the requested language.
Keep building numbers, addresses, URLs and markdown formatting exactly as they are.
Answer only with the translation, without any explanation or commentary.";

/// Text translation interface
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target_language` (a language name such as "English")
    async fn translate(&self, text: &str, target_language: &str) -> Result<String>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Translator backed by a language model
pub struct LlmTranslator {
    llm: Arc<dyn LanguageModel>,
    prompt_builder: Llama3PromptBuilder,
    generation: GenerationConfig,
}

impl LlmTranslator {
    pub fn new(llm: Arc<dyn LanguageModel>, generation: GenerationConfig) -> Self {
        Self {
            llm,
            prompt_builder: Llama3PromptBuilder::new(SYSTEM_PROMPT_TRANSLATOR),
            generation,
        }
    }

    fn user_message(text: &str, target_language: &str) -> String {
        format!(
            "Translate the following text to {}:\n\n---\n\n{}",
            target_language, text
        )
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let prompt = self
            .prompt_builder
            .single(&Self::user_message(text, target_language));
        let translated = self.llm.generate(&prompt, &self.generation).await?;

        tracing::debug!(
            target_language,
            input_len = text.len(),
            output_len = translated.len(),
            "Translated text"
        );
        Ok(translated.trim().to_string())
    }

    fn name(&self) -> &str {
        "llm_translator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_guide_core::Error;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for RecordingLlm {
        async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            assert_eq!(config.max_new_tokens, 2048);
            if self.fail {
                return Err(Error::Llm("503 from backend".into()));
            }
            Ok("  Building 50.34 is at Am Fasanengarten 5.\n".to_string())
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn translator(llm: Arc<RecordingLlm>) -> LlmTranslator {
        LlmTranslator::new(llm, GenerationConfig::new(0.01, 2048))
    }

    #[tokio::test]
    async fn test_translation_prompt_and_trim() {
        let llm = Arc::new(RecordingLlm::default());
        let out = translator(llm.clone())
            .translate("Gebäude 50.34 liegt Am Fasanengarten 5.", "English")
            .await
            .unwrap();

        assert_eq!(out, "Building 50.34 is at Am Fasanengarten 5.");
        let prompts = llm.prompts.lock();
        assert!(prompts[0].contains(
            "Translate the following text to English:\n\n---\n\nGebäude 50.34 liegt Am Fasanengarten 5."
        ));
    }

    #[tokio::test]
    async fn test_empty_text_skips_model() {
        let llm = Arc::new(RecordingLlm::default());
        let out = translator(llm.clone()).translate("  ", "English").await.unwrap();
        assert!(out.is_empty());
        assert!(llm.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let llm = Arc::new(RecordingLlm {
            fail: true,
            ..Default::default()
        });
        let err = translator(llm).translate("Hallo", "English").await.unwrap_err();
        assert!(err.is_upstream());
    }
}
