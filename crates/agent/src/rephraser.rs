//! Query Rephraser
//!
//! Turns a follow-up question into a standalone retrieval query by
//! resolving references against the visible dialogue.

use std::sync::Arc;

use campus_guide_core::{Conversation, GenerationConfig, LanguageModel, Result, Role};
use campus_guide_llm::Llama3PromptBuilder;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::prompts::{rephrasing_prompt, REPHRASER_SYSTEM_PROMPT};

/// Labels small models like to put in front of the rewritten query
static FRAMING_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(rephrased query|rewritten query|umformulierte (anfrage|frage)|anfrage|query)\s*:\s*",
    )
    .unwrap()
});

pub struct QueryRephraser {
    llm: Arc<dyn LanguageModel>,
    prompt_builder: Llama3PromptBuilder,
    generation: GenerationConfig,
}

impl QueryRephraser {
    pub fn new(llm: Arc<dyn LanguageModel>, generation: GenerationConfig) -> Self {
        Self {
            llm,
            prompt_builder: Llama3PromptBuilder::new(REPHRASER_SYSTEM_PROMPT),
            generation,
        }
    }

    /// `User: ...` / `Assistant: ...` lines of the dialogue so far
    pub fn format_history(conversation: &Conversation) -> String {
        conversation
            .dialogue()
            .map(|message| {
                let speaker = match message.role() {
                    Role::User => "User",
                    _ => "Assistant",
                };
                format!("{}: {}", speaker, message.content())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Standalone version of `query` given the conversation so far
    pub async fn rephrase(&self, conversation: &Conversation, query: &str) -> Result<String> {
        let history = Self::format_history(conversation);
        let prompt = self
            .prompt_builder
            .single(&rephrasing_prompt(&history, query));

        let response = self.llm.generate(&prompt, &self.generation).await?;
        let rephrased = strip_framing(&response);

        if rephrased.is_empty() {
            tracing::warn!(raw = %response, "Rephraser returned no query, using original");
            return Ok(query.trim().to_string());
        }
        Ok(rephrased)
    }
}

/// Keep only the query itself: the first line that is neither a bare label
/// nor a preamble ending in a colon, without a label or surrounding quotes
fn strip_framing(response: &str) -> String {
    response
        .lines()
        .map(|line| {
            let line = line.trim();
            let unlabeled = FRAMING_LABEL.replace(line, "");
            (line.ends_with(':'), unquote(&unlabeled))
        })
        .find(|(preamble, text)| !preamble && !text.is_empty())
        .map(|(_, text)| text)
        .unwrap_or_default()
}

fn unquote(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '„' || c == '“' || c == '`')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;
    use campus_guide_core::Message;

    fn rephraser(llm: Arc<ScriptedLlm>) -> QueryRephraser {
        QueryRephraser::new(llm, GenerationConfig::new(0.1, 128))
    }

    #[test]
    fn test_strip_framing() {
        assert_eq!(
            strip_framing("Rephrased Query: \"Wann hat die Mensa morgen auf?\""),
            "Wann hat die Mensa morgen auf?"
        );
        assert_eq!(
            strip_framing("\n  Wo ist Gebäude 50.34?\nI resolved nothing."),
            "Wo ist Gebäude 50.34?"
        );
        assert_eq!(strip_framing("   "), "");
    }

    #[test]
    fn test_strip_framing_skips_label_and_preamble_lines() {
        assert_eq!(
            strip_framing("Rephrased Query:\nWann hat die Mensa am Adenauerring morgen auf?"),
            "Wann hat die Mensa am Adenauerring morgen auf?"
        );
        assert_eq!(
            strip_framing("Here is the rephrased query:\n\n\"Wann hat die Mensa morgen auf?\""),
            "Wann hat die Mensa morgen auf?"
        );
        assert_eq!(strip_framing("Rephrased Query:\n  \n"), "");
    }

    #[test]
    fn test_history_excludes_context_and_system() {
        let mut conversation = Conversation::new();
        conversation.push(Message::system("sys"));
        conversation.push(Message::user("Ich suche die Mensa am Adenauerring"));
        conversation.push(Message::retrieved_context("[{\"id\":\"01.12\"}]"));
        conversation.push(Message::assistant("Die Mensa liegt am Adenauerring 7."));

        assert_eq!(
            QueryRephraser::format_history(&conversation),
            "User: Ich suche die Mensa am Adenauerring\nAssistant: Die Mensa liegt am Adenauerring 7."
        );
    }

    #[tokio::test]
    async fn test_rephrase_resolves_with_history_in_prompt() {
        let llm = ScriptedLlm::new(["Wann hat die Mensa am Adenauerring morgen auf?"]);
        let mut conversation = Conversation::new();
        conversation.push(Message::user("Ich suche die Mensa am Adenauerring"));
        conversation.push(Message::retrieved_context("[]"));
        conversation.push(Message::assistant("Sie liegt am Adenauerring 7."));

        let rephrased = rephraser(llm.clone())
            .rephrase(&conversation, "Wann hat sie morgen auf?")
            .await
            .unwrap();
        assert_eq!(rephrased, "Wann hat die Mensa am Adenauerring morgen auf?");

        let prompt = llm.prompt(0);
        assert!(prompt.contains("User: Ich suche die Mensa am Adenauerring"));
        assert!(prompt.contains("User Query: \"Wann hat sie morgen auf?\""));
        assert!(!prompt.contains("retrieved documents"));
    }

    #[tokio::test]
    async fn test_label_on_own_line_keeps_resolution() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("Ich suche die Mensa am Adenauerring"));
        conversation.push(Message::assistant("Sie liegt am Adenauerring 7."));

        for reply in [
            "Rephrased Query:\nWann hat die Mensa am Adenauerring morgen auf?",
            "Here is the rephrased query:\nWann hat die Mensa am Adenauerring morgen auf?",
        ] {
            let rephrased = rephraser(ScriptedLlm::new([reply]))
                .rephrase(&conversation, "Wann hat sie morgen auf?")
                .await
                .unwrap();
            assert_eq!(
                rephrased, "Wann hat die Mensa am Adenauerring morgen auf?",
                "reply: {:?}",
                reply
            );
        }
    }

    #[tokio::test]
    async fn test_empty_history_is_near_identity() {
        let llm = ScriptedLlm::new(["Wo ist Gebäude 50.34?"]);
        let rephrased = rephraser(llm)
            .rephrase(&Conversation::new(), "Wo ist Gebäude 50.34?")
            .await
            .unwrap();
        assert_eq!(rephrased, "Wo ist Gebäude 50.34?");
    }

    #[tokio::test]
    async fn test_blank_reply_falls_back_to_query() {
        let llm = ScriptedLlm::new(["\n\n"]);
        let rephrased = rephraser(llm)
            .rephrase(&Conversation::new(), " Audimax ")
            .await
            .unwrap();
        assert_eq!(rephrased, "Audimax");
    }

    #[tokio::test]
    async fn test_backend_error_fails() {
        let llm = ScriptedLlm::failing();
        let err = rephraser(llm)
            .rephrase(&Conversation::new(), "Audimax")
            .await
            .unwrap_err();
        assert!(err.is_upstream());
    }
}
