//! # Dialogue Context
//!
//! Ordered, role-tagged turn history of one session. It is seeded with the
//! system prompt and then only mutated by the two aggregation stages: the
//! user aggregator appends caller turns, the assistant aggregator appends bot
//! turns once their audio has been spoken.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn, serialized in the chat-completions message shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Shared handle to a session's dialogue.
///
/// Cloning is cheap; every clone sees the same turns. The lock is held only
/// for a single append or snapshot.
#[derive(Debug, Clone)]
pub struct DialogueContext {
    turns: Arc<Mutex<Vec<ChatMessage>>>,
}

impl DialogueContext {
    /// Create a context holding exactly one system message.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(vec![ChatMessage::system(system_prompt)])),
        }
    }

    pub fn append(&self, message: ChatMessage) {
        self.lock().push(message);
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ChatMessage>> {
        // A panic while holding the lock cannot leave a half-written Vec.
        self.turns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
