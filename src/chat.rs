use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{RagError, Result};
use crate::llm::{GenerationConfig, LanguageModel};
use crate::model::{ChatMessage, Role, ScoredCandidate};
use crate::retrieval::Retriever;

pub const DEFAULT_TOKEN_LIMIT: usize = 3000;
pub const DEFAULT_SIMILARITY_TOP_K: usize = 5;
const CONTEXT_CHARS_PER_RECORD: usize = 2000;

pub const SYSTEM_PROMPT: &str = "You are a helpful HR assistant for HireFlow, an intelligent candidate search system.
You have access to a database of candidate resumes. Your role is to:
- Answer questions about candidates' skills, experience, and qualifications
- Compare candidates based on specific criteria
- Provide recommendations for job roles
- Remember the conversation context and refer back to previous answers

Be concise, professional, and cite specific details from the resumes when possible.";

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// History budget in estimated tokens.
    pub token_limit: usize,
    /// Records retrieved as context for every turn.
    pub similarity_top_k: usize,
    pub generation: GenerationConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token_limit: DEFAULT_TOKEN_LIMIT,
            similarity_top_k: DEFAULT_SIMILARITY_TOP_K,
            generation: GenerationConfig::default(),
        }
    }
}

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Conversation memory holding complete turns only, trimmed oldest-first to a
/// token budget. The newest turn survives even when it alone exceeds the budget.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    turns: VecDeque<(ChatMessage, ChatMessage)>,
    token_limit: usize,
}

impl ChatHistory {
    pub fn new(token_limit: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            token_limit,
        }
    }

    pub fn push_turn(&mut self, user: ChatMessage, assistant: ChatMessage) {
        self.turns.push_back((user, assistant));
        while self.turns.len() > 1 && self.estimated_tokens() > self.token_limit {
            self.turns.pop_front();
        }
    }

    pub fn estimated_tokens(&self) -> usize {
        self.turns
            .iter()
            .map(|(u, a)| estimate_tokens(&u.content) + estimate_tokens(&a.content))
            .sum()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .flat_map(|(u, a)| [u.clone(), a.clone()])
            .collect()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// A multi-turn conversation grounded in the candidate index.
pub struct ConversationSession {
    retriever: Retriever,
    llm: Arc<dyn LanguageModel>,
    config: ChatConfig,
    job_description: Option<String>,
    history: ChatHistory,
    closed: bool,
}

impl ConversationSession {
    pub fn new(
        retriever: Retriever,
        llm: Arc<dyn LanguageModel>,
        config: ChatConfig,
        job_description: Option<String>,
    ) -> Self {
        let job_description = job_description
            .map(|jd| jd.trim().to_string())
            .filter(|jd| !jd.is_empty());
        let history = ChatHistory::new(config.token_limit);
        Self {
            retriever,
            llm,
            config,
            job_description,
            history,
            closed: false,
        }
    }

    pub async fn send(&mut self, message: &str) -> Result<String> {
        self.send_with_cancel(message, &CancellationToken::new()).await
    }

    /// One conversational turn. History is only updated when the turn
    /// completes, so a failed or cancelled turn leaves it untouched.
    pub async fn send_with_cancel(
        &mut self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if self.closed {
            return Err(RagError::SessionClosed);
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(RagError::InvalidArgument(
                "chat message must not be empty".to_string(),
            ));
        }

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RagError::Cancelled),
            reply = self.answer(message) => reply?,
        };

        self.history
            .push_turn(ChatMessage::user(message), ChatMessage::assistant(reply.as_str()));
        tracing::debug!(
            "Chat history: {} turn(s), ~{} tokens",
            self.history.turn_count(),
            self.history.estimated_tokens()
        );
        Ok(reply)
    }

    async fn answer(&self, message: &str) -> Result<String> {
        let context = self
            .retriever
            .retrieve(message, self.config.similarity_top_k)
            .await?;
        let prompt = self.build_prompt(message, &context);
        let reply = self.llm.generate(&prompt, &self.config.generation).await?;
        Ok(reply.trim().to_string())
    }

    fn build_prompt(&self, message: &str, context: &[ScoredCandidate]) -> String {
        let mut prompt = String::from(SYSTEM_PROMPT);
        prompt.push_str("\n\n");

        if let Some(jd) = &self.job_description {
            prompt.push_str("The position being filled has these requirements:\n");
            prompt.push_str(jd);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Context information from candidate resumes is below.\n");
        prompt.push_str("--------------------\n");
        for candidate in context {
            prompt.push_str(&format!(
                "[{}] Source: {}\n{}\n\n",
                candidate.rank,
                candidate.record.file_name(),
                candidate.record.snippet(CONTEXT_CHARS_PER_RECORD)
            ));
        }
        prompt.push_str("--------------------\n\n");

        prompt.push_str("Conversation:\n");
        for entry in self.history.messages() {
            prompt.push_str(&format!("{}: {}\n", entry.role.label(), entry.content));
        }
        prompt.push_str(&format!("{}: {message}\n", Role::User.label()));
        prompt.push_str(&format!("{}:", Role::Assistant.label()));
        prompt
    }

    /// Forget the conversation; the job description and index stay bound.
    pub fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(RagError::SessionClosed);
        }
        self.history.clear();
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn job_description(&self) -> Option<&str> {
        self.job_description.as_deref()
    }
}
