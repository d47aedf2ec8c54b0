//! Conversation types
//!
//! A [`Conversation`] is an append-only log of [`Message`]s owned by one
//! session. Message roles decide how prompt builders render each entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions
    System,
    /// End user
    User,
    /// Model answer
    Assistant,
    /// Retrieved building records attached to a turn
    RetrievedContext,
    /// Output of a tool or structured query
    ToolOutput,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::RetrievedContext => "retrieved_context",
            Role::ToolOutput => "tool_output",
        }
    }

    /// Whether the message belongs to the visible user/assistant dialogue
    pub fn is_dialogue(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single entry of a conversation. The role is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    id: String,
    timestamp: DateTime<Utc>,
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn retrieved_context(content: impl Into<String>) -> Self {
        Self::new(Role::RetrievedContext, content)
    }

    pub fn tool_output(content: impl Into<String>) -> Self {
        Self::new(Role::ToolOutput, content)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered message history of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: String,
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Start an empty conversation with a fresh id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    /// One-message conversation, used for single-shot model calls
    pub fn single(message: Message) -> Self {
        let mut conversation = Self::new();
        conversation.push(message);
        conversation
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_content(&mut self, role: Role, content: impl Into<String>) {
        self.push(Message::new(role, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// User and assistant turns only, in order
    pub fn dialogue(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role().is_dialogue())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Drop all messages, keeping the conversation id
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
