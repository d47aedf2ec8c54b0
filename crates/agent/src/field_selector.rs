//! Field Selector
//!
//! Narrows retrieved records to the fields a question needs, so the answer
//! prompt stays small. The model only ever removes keys; any output that
//! cannot be used leaves the documents untouched.

use std::collections::BTreeSet;
use std::sync::Arc;

use campus_guide_core::{
    Conversation, GenerationConfig, LanguageModel, Message, Result, RetrievedDocument,
};
use campus_guide_llm::{parse_json, Llama3PromptBuilder, ModelOutputError};

use crate::prompts::{AVAILABLE_FIELDS_PRE, SYSTEM_PROMPT_DATA_FIELDS, USER_QUERY_PRE_FIELDS};

pub struct FieldSelector {
    llm: Arc<dyn LanguageModel>,
    generation: GenerationConfig,
}

impl FieldSelector {
    pub fn new(llm: Arc<dyn LanguageModel>, generation: GenerationConfig) -> Self {
        Self { llm, generation }
    }

    /// Union of keys with a non-empty value across all documents
    pub fn field_options(documents: &[RetrievedDocument]) -> BTreeSet<String> {
        documents
            .iter()
            .flat_map(|doc| doc.non_empty_keys().cloned())
            .collect()
    }

    fn prompt(query: &str, fields: &BTreeSet<String>) -> String {
        let field_list = serde_json::to_string(fields).unwrap_or_default();
        let mut conversation = Conversation::new();
        conversation.push(Message::user(format!("{} {}", USER_QUERY_PRE_FIELDS, query)));
        conversation.push(Message::user(format!("{} {}", AVAILABLE_FIELDS_PRE, field_list)));
        Llama3PromptBuilder::with_system(SYSTEM_PROMPT_DATA_FIELDS, &conversation)
    }

    /// Reduce every document to the fields relevant for `query`.
    ///
    /// Backend errors fail the call; unusable model output returns the
    /// documents unchanged.
    pub async fn select(
        &self,
        query: &str,
        documents: Vec<RetrievedDocument>,
    ) -> Result<Vec<RetrievedDocument>> {
        let fields = Self::field_options(&documents);
        if fields.is_empty() {
            return Ok(documents);
        }

        let response = self
            .llm
            .generate(&Self::prompt(query, &fields), &self.generation)
            .await?;

        match interpret(&response, &fields) {
            Ok(selected) => {
                tracing::debug!(
                    offered = fields.len(),
                    selected = ?selected,
                    "Identified relevant fields"
                );
                Ok(documents
                    .iter()
                    .map(|doc| doc.with_fields(selected.iter().map(String::as_str)))
                    .collect())
            }
            Err(reason) => {
                tracing::warn!(
                    reason = reason.tag(),
                    error = %reason,
                    raw = %response,
                    "Field selection unusable, keeping all fields"
                );
                Ok(documents)
            }
        }
    }
}

/// Parse the selected field names, keeping only offered ones
fn interpret(
    response: &str,
    offered: &BTreeSet<String>,
) -> std::result::Result<BTreeSet<String>, ModelOutputError> {
    let value: serde_json::Value = parse_json(response)?;
    let items = value
        .as_array()
        .ok_or_else(|| ModelOutputError::UnexpectedShape(format!("expected array, got {}", value)))?;

    let mut selected = BTreeSet::new();
    for item in items {
        let name = item
            .as_str()
            .ok_or_else(|| ModelOutputError::UnexpectedShape(format!("non-string entry {}", item)))?;
        if offered.contains(name) {
            selected.insert(name.to_string());
        }
    }

    if selected.is_empty() {
        return Err(ModelOutputError::EmptySelection(format!(
            "none of the offered fields selected: {}",
            value
        )));
    }
    Ok(selected)
}
