use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::llm::{GenerationConfig, LanguageModel};

/// A reply the scripted model hands out for one call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(ScriptedFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Generation,
    Unauthorized,
}

/// In-process `LanguageModel` that answers from a queue of canned replies and
/// records every prompt it receives. When the queue runs dry it falls back to
/// the configured default reply.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    routes: Vec<(String, String)>,
    fallback: String,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            routes: Vec::new(),
            fallback: fallback.into(),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies<I>(mut self, replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        self.replies = Mutex::new(replies.into_iter().collect());
        self
    }

    /// Prompts containing `needle` get `reply`, regardless of call order.
    pub fn route(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.routes.push((needle.into(), reply.into()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn next_reply(&self, prompt: &str) -> ScriptedReply {
        if let Some((_, reply)) = self.routes.iter().find(|(needle, _)| prompt.contains(needle)) {
            return ScriptedReply::Text(reply.clone());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| ScriptedReply::Text(self.fallback.clone()))
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let reply = self.next_reply(prompt);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Fail(ScriptedFailure::Generation) => {
                Err(RagError::Generation("scripted upstream failure".to_string()))
            }
            ScriptedReply::Fail(ScriptedFailure::Unauthorized) => {
                Err(RagError::Unauthorized("scripted credential failure".to_string()))
            }
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
