//! Query Router
//!
//! Decides whether a query is a lookup of a few buildings (NORMAL, served by
//! the retrieval engine) or needs filtering/aggregation over the whole table
//! (COMPLEX, served by the structured query engine). Ambiguity always lands
//! on NORMAL.

use serde::Deserialize;
use std::sync::Arc;

use campus_guide_core::{GenerationConfig, LanguageModel, QueryType, Result};
use campus_guide_llm::{parse_json, Llama3PromptBuilder, ModelOutputError};

use crate::prompts::ROUTER_SYSTEM_PROMPT;

/// Override tokens a user can put into the query
pub const FORCE_COMPLEX_TOKEN: &str = "/complex";
pub const FORCE_NORMAL_TOKEN: &str = "/normal";

#[derive(Debug, Deserialize)]
struct RouterReply {
    query_type: String,
}

pub struct QueryRouter {
    llm: Arc<dyn LanguageModel>,
    prompt_builder: Llama3PromptBuilder,
    generation: GenerationConfig,
    allow_complex_mode: bool,
}

impl QueryRouter {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        generation: GenerationConfig,
        allow_complex_mode: bool,
    ) -> Self {
        Self {
            llm,
            prompt_builder: Llama3PromptBuilder::new(ROUTER_SYSTEM_PROMPT),
            generation,
            allow_complex_mode,
        }
    }

    pub fn allows_complex_mode(&self) -> bool {
        self.allow_complex_mode
    }

    /// Classify a turn. Override tokens are looked up in the original query,
    /// the model sees the rephrased one.
    pub async fn classify(&self, rephrased_query: &str, original_query: &str) -> Result<QueryType> {
        if !self.allow_complex_mode {
            return Ok(QueryType::Normal);
        }

        if original_query.contains(FORCE_COMPLEX_TOKEN) {
            tracing::debug!("Complex route forced by user");
            return Ok(QueryType::Complex);
        }
        if original_query.contains(FORCE_NORMAL_TOKEN) {
            tracing::debug!("Normal route forced by user");
            return Ok(QueryType::Normal);
        }

        let prompt = self.prompt_builder.single(rephrased_query);
        let response = self.llm.generate(&prompt, &self.generation).await?;

        match interpret(&response) {
            Ok(query_type) => Ok(query_type),
            Err(reason) => {
                tracing::error!(
                    reason = reason.tag(),
                    error = %reason,
                    raw = %response,
                    "Failed to classify query, using normal route"
                );
                Ok(QueryType::Normal)
            }
        }
    }
}

/// Read the `{"query_type": ...}` payload
fn interpret(response: &str) -> std::result::Result<QueryType, ModelOutputError> {
    let reply: RouterReply = parse_json(response)?;
    QueryType::parse(&reply.query_type)
        .ok_or(ModelOutputError::UnknownValue(reply.query_type))
}
