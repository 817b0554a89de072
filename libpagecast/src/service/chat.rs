//! Multi-turn chat assistant
//!
//! The whole conversation is resent on every turn under a fixed system
//! instruction. Turns older than [`MAX_TURNS`] are dropped from the front.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::instrument;

use crate::error::{PagecastError, Result};
use crate::platforms::{Content, GenerateContentRequest, GenerativeApi, Part};
use crate::prompts::{CHAT_GREETING, CHAT_SYSTEM_INSTRUCTION};
use crate::service::generation::answer_text;

/// Messages kept in the conversation (user and model combined)
pub const MAX_TURNS: usize = 40;

pub struct ChatSession {
    api: Arc<dyn GenerativeApi>,
    model: String,
    history: VecDeque<Content>,
}

impl ChatSession {
    pub fn new(api: Arc<dyn GenerativeApi>, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
            history: VecDeque::new(),
        }
    }

    pub fn greeting(&self) -> &'static str {
        CHAT_GREETING
    }

    pub fn history(&self) -> &VecDeque<Content> {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Send one user message and return the reply
    ///
    /// On failure the user message is not kept, so the caller can retry it.
    #[instrument(skip_all, fields(turns = self.history.len()))]
    pub async fn send(&mut self, message: &str) -> Result<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(PagecastError::InvalidInput("Message cannot be empty".to_string()));
        }

        let mut contents: Vec<Content> = self.history.iter().cloned().collect();
        contents.push(Content::user(vec![Part::text(message)]));
        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(CHAT_SYSTEM_INSTRUCTION)],
            }),
            generation_config: None,
        };

        let response = self.api.generate_content(&self.model, &request).await?;
        let reply = answer_text(&response)?;

        self.history.push_back(Content::user(vec![Part::text(message)]));
        self.history.push_back(Content::model(reply.clone()));
        while self.history.len() > MAX_TURNS {
            self.history.pop_front();
        }
        Ok(reply)
    }
}
