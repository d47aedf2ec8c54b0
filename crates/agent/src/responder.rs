//! Response Generator
//!
//! Renders the whole conversation, including retrieved-context turns, into
//! the answer prompt.

use chrono::Local;
use serde::Serialize;
use std::sync::Arc;

use campus_guide_core::{Conversation, GenerationConfig, LanguageModel, Result, RetrievedDocument};
use campus_guide_llm::Llama3PromptBuilder;

use crate::prompts::campus_guide_system_prompt;

#[derive(Serialize)]
struct ContextEntry<'a> {
    id: &'a str,
    relevance_score: f32,
    data: &'a campus_guide_core::FieldMap,
}

/// JSON body of a retrieved-context message; `[]` when nothing was found
pub fn render_documents(documents: &[RetrievedDocument]) -> String {
    let entries: Vec<ContextEntry<'_>> = documents
        .iter()
        .map(|doc| ContextEntry {
            id: &doc.id,
            relevance_score: doc.relevance_score,
            data: &doc.data,
        })
        .collect();
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}

pub struct ResponseGenerator {
    llm: Arc<dyn LanguageModel>,
    generation: GenerationConfig,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, generation: GenerationConfig) -> Self {
        Self { llm, generation }
    }

    pub fn generation(&self) -> GenerationConfig {
        self.generation
    }

    /// Answer the last user turn of `conversation`
    pub async fn generate(&self, conversation: &Conversation) -> Result<String> {
        let system_prompt = campus_guide_system_prompt(Local::now());
        let prompt = Llama3PromptBuilder::with_system(&system_prompt, conversation);
        let answer = self.llm.generate(&prompt, &self.generation).await?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;
    use campus_guide_core::{FieldMap, Message};
    use serde_json::json;

    #[test]
    fn test_render_documents() {
        assert_eq!(render_documents(&[]), "[]");

        let mut data = FieldMap::new();
        data.insert("adresse".into(), json!("Am Fasanengarten 5"));
        let rendered = render_documents(&[RetrievedDocument::exact("50.34", data)]);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value[0]["id"], "50.34");
        assert_eq!(value[0]["relevance_score"], 1.0);
        assert_eq!(value[0]["data"]["adresse"], "Am Fasanengarten 5");
    }

    #[tokio::test]
    async fn test_prompt_contains_history_and_context() {
        let llm = ScriptedLlm::new(["  Gebäude 50.34 liegt Am Fasanengarten 5.  "]);
        let generator = ResponseGenerator::new(llm.clone(), GenerationConfig::new(0.05, 1024));

        let mut conversation = Conversation::new();
        conversation.push(Message::user("Wo ist Gebäude 50.34?"));
        conversation.push(Message::retrieved_context("[{\"id\":\"50.34\"}]"));

        let answer = generator.generate(&conversation).await.unwrap();
        assert_eq!(answer, "Gebäude 50.34 liegt Am Fasanengarten 5.");

        let prompt = llm.prompt(0);
        assert!(prompt.contains("Du bist CampusGuide"));
        assert!(prompt.contains("Aktuelle Uhrzeit: "));
        assert!(prompt.contains("<|start_header_id|>user<|end_header_id|>Wo ist Gebäude 50.34?"));
        assert!(prompt.contains("# retrieved documents\n[{\"id\":\"50.34\"}]"));
        assert!(prompt.ends_with("<|start_header_id|>assistant<|end_header_id|>"));
    }
}
