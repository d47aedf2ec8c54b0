//! Scripted language model for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use campus_guide_core::{Error, GenerationConfig, LanguageModel, Result};

/// Replies from a fixed queue and records every prompt
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl ScriptedLlm {
    pub(crate) fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub(crate) fn prompt(&self, index: usize) -> String {
        self.prompts.lock()[index].clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if self.fail {
            return Err(Error::Llm("backend unavailable".to_string()));
        }
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Llm("script exhausted".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
