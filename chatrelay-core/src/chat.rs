// ABOUTME: Per-chat state: settings, bounded conversation history and image cooldown.
// ABOUTME: A Chat is keyed by ChatId; negative ids denote group chats.

use chatrelay_llm::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform chat identifier. Negative values are group chats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn is_group(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-chat tunables, seeded from config defaults when the chat is first seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub temperature: f32,
    pub model: String,
    /// Upper bound on retained history entries
    pub max_history: usize,
    pub use_markdown: bool,
    /// Empty means "no system message"
    pub system_prompt: String,
}

/// One user prompt and, once answered, the assistant's response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub prompt: Message,
    #[serde(default)]
    pub response: Option<Message>,
}

impl ConversationEntry {
    /// A new entry awaiting its response
    pub fn pending(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Message::user(prompt),
            response: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.response.as_ref().map_or(true, Message::is_blank)
    }

    pub fn set_response(&mut self, text: impl Into<String>) {
        self.response = Some(Message::assistant(text));
    }
}

/// Everything the bot remembers about one chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: ChatId,
    pub settings: ChatSettings,
    #[serde(default)]
    pub history: Vec<ConversationEntry>,
    pub next_image_gen_allowed_at: DateTime<Utc>,
}

impl Chat {
    /// Fresh chat with empty history; image generation allowed immediately
    pub fn new(chat_id: ChatId, settings: ChatSettings) -> Self {
        Self {
            chat_id,
            settings,
            history: Vec::new(),
            next_image_gen_allowed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn is_group(&self) -> bool {
        self.chat_id.is_group()
    }

    /// Drop the most recent `count` entries, returning how many were removed
    pub fn rollback(&mut self, count: usize) -> usize {
        let removed = count.min(self.history.len());
        self.history.truncate(self.history.len() - removed);
        removed
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn image_generation_allowed(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_image_gen_allowed_at
    }
}
