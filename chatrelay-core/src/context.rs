// ABOUTME: Shared runtime context handed to the dispatcher and every worker.
// ABOUTME: Bundles platform, completion backend, chat store, chat locks, config and transcripts.

use crate::chat::{Chat, ChatId};
use crate::config::Config;
use crate::locks::ChatLocks;
use crate::store::ChatStore;
use crate::traits::MessagingPlatform;
use crate::transcript::TranscriptLog;
use anyhow::Result;
use chatrelay_llm::CompletionBackend;
use std::sync::Arc;

pub struct BotContext {
    pub platform: Arc<dyn MessagingPlatform>,
    pub completion: Arc<dyn CompletionBackend>,
    pub store: Arc<dyn ChatStore>,
    pub locks: ChatLocks,
    pub config: Arc<Config>,
    pub transcripts: TranscriptLog,
}

impl BotContext {
    pub fn new(
        config: Config,
        platform: Arc<dyn MessagingPlatform>,
        completion: Arc<dyn CompletionBackend>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        let transcripts = TranscriptLog::new(config.storage.transcript_dir());
        Self {
            platform,
            completion,
            store,
            locks: ChatLocks::new(),
            config: Arc::new(config),
            transcripts,
        }
    }

    /// A new chat seeded with the configured defaults
    pub fn default_chat(&self, chat_id: ChatId) -> Chat {
        Chat::new(chat_id, self.config.chat.to_settings())
    }

    /// Stored chat, or a default one if the store has none.
    /// Callers mutating the result must hold the chat's lock.
    pub fn load_chat(&self, chat_id: ChatId) -> Result<Chat> {
        Ok(self
            .store
            .get(chat_id)?
            .unwrap_or_else(|| self.default_chat(chat_id)))
    }

    /// Send a plain notice to the admin chat, if one is configured. Failures are logged.
    pub async fn notify_admin(&self, text: &str) {
        let Some(admin_id) = self.config.access.admin_id else {
            return;
        };
        if let Err(e) = self.platform.send_direct(ChatId(admin_id), text).await {
            tracing::warn!(admin_id, error = %e, "Failed to notify admin");
            crate::metrics::record_error("admin_notify");
        }
    }
}
