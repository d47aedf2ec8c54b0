//! Prompt Building
//!
//! Renders conversations into the Llama 3 chat template used by the
//! text-completion backends.

use campus_guide_core::{Conversation, Message, Role};
use once_cell::sync::Lazy;
use regex::Regex;

const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const END_OF_TURN: &str = "<|eot_id|>";
const RETRIEVED_HEADER: &str = "# retrieved documents\n";

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// Llama 3 prompt builder bound to one system prompt
#[derive(Debug, Clone)]
pub struct Llama3PromptBuilder {
    system_prompt: String,
}

impl Llama3PromptBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn block(header: &str, content: &str) -> String {
        format!(
            "<|start_header_id|>{}<|end_header_id|>{}{}",
            header, content, END_OF_TURN
        )
    }

    /// Render one message according to its role
    pub fn format_message(message: &Message) -> String {
        match message.role() {
            Role::System => Self::block("system", message.content()),
            Role::User => Self::block("user", message.content()),
            Role::Assistant => Self::block("assistant", message.content()),
            Role::RetrievedContext => Self::block(
                "ipython",
                &format!("{}{}", RETRIEVED_HEADER, message.content()),
            ),
            Role::ToolOutput => Self::block("ipython", message.content()),
        }
    }

    /// System prompt plus a single user message
    pub fn single(&self, user_message: &str) -> String {
        format!(
            "{}{}{}<|start_header_id|>assistant<|end_header_id|>",
            BEGIN_OF_TEXT,
            Self::block("system", &self.system_prompt),
            Self::block("user", user_message),
        )
    }

    /// System prompt plus the complete conversation
    pub fn from_conversation(&self, conversation: &Conversation) -> String {
        Self::with_system(&self.system_prompt, conversation)
    }

    /// Render a conversation under an explicit system prompt
    pub fn with_system(system_prompt: &str, conversation: &Conversation) -> String {
        let mut prompt = String::with_capacity(256 + conversation.len() * 128);
        prompt.push_str(BEGIN_OF_TEXT);
        prompt.push_str(&Self::block("system", system_prompt));
        for message in conversation.messages() {
            prompt.push_str(&Self::format_message(message));
        }
        prompt.push_str("<|start_header_id|>assistant<|end_header_id|>");
        prompt
    }
}

/// Normalise a raw completion: drop reasoning blocks, a leading
/// `assistant` header token and surrounding whitespace.
pub fn clean_response(raw: &str) -> String {
    let without_think = THINK_BLOCK.replace_all(raw, "");
    let trimmed = without_think.trim();
    let trimmed = trimmed.strip_prefix("assistant").unwrap_or(trimmed);
    trimmed.trim().to_string()
}
