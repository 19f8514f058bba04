use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use gemcrust_common::{ChatId, ModelVariant};

use crate::providers::Content;
use crate::session_store::Resettable;

/// Store key for one conversation talking to one model variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Combine chat and variant as `"{chat_id}:{variant}"`. Neither part can
    /// contain `:`, so distinct inputs never collide.
    pub fn derive(chat_id: ChatId, variant: ModelVariant) -> Self {
        Self(format!("{}:{}", chat_id.0, variant.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Conversation context sent to the backend with every new turn.
#[derive(Debug)]
pub struct ChatSession {
    variant: ModelVariant,
    model: String,
    history: Mutex<Vec<Content>>,
}

impl ChatSession {
    pub fn new(variant: ModelVariant, model: impl Into<String>) -> Self {
        Self {
            variant,
            model: model.into(),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Snapshot of the prior turns, oldest first.
    pub fn history(&self) -> Vec<Content> {
        self.lock().clone()
    }

    pub fn history_len(&self) -> usize {
        self.lock().len()
    }

    /// Append a completed exchange.
    pub fn record_turn(&self, user: Content, reply: Content) {
        let mut history = self.lock();
        history.push(user);
        history.push(reply);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Content>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Resettable for ChatSession {
    fn reset(&self) {
        self.lock().clear();
    }
}
