// ABOUTME: In-memory MessagingPlatform for tests: scripted updates in, recorded sends out.
// ABOUTME: Also builds a BotContext wired to a MockBackend and a MemoryChatStore.

use crate::chat::ChatId;
use crate::config::Config;
use crate::context::BotContext;
use crate::store::MemoryChatStore;
use crate::traits::{MessagingPlatform, Update, UpdateStream};
use anyhow::Result;
use async_trait::async_trait;
use chatrelay_llm::backends::mock::MockBackend;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub const MOCK_BOT_USERNAME: &str = "relay_bot";
pub const MOCK_BOT_ID: i64 = 4242;

/// Something the bot sent through the platform
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Reply {
        chat_id: ChatId,
        reply_to: i32,
        text: String,
        markdown: bool,
    },
    Direct {
        chat_id: ChatId,
        text: String,
    },
    Image {
        chat_id: ChatId,
        url: String,
        caption: String,
    },
}

impl Sent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Sent::Reply { chat_id, .. } | Sent::Direct { chat_id, .. } | Sent::Image { chat_id, .. } => {
                *chat_id
            }
        }
    }

    /// Text or caption
    pub fn text(&self) -> &str {
        match self {
            Sent::Reply { text, .. } | Sent::Direct { text, .. } => text,
            Sent::Image { caption, .. } => caption,
        }
    }
}

#[derive(Clone)]
pub struct MockPlatform {
    updates: Arc<Mutex<Vec<Update>>>,
    sent: Arc<Mutex<Vec<Sent>>>,
    notify: Arc<Notify>,
    fail_direct: Arc<AtomicBool>,
    commands: Arc<Mutex<Vec<(String, String)>>>,
    reply_gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            updates: Arc::new(Mutex::new(Vec::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            fail_direct: Arc::new(AtomicBool::new(false)),
            commands: Arc::new(Mutex::new(Vec::new())),
            reply_gate: Arc::new(Mutex::new(None)),
        }
    }

    /// Updates yielded, in order, by the next `update_stream` call
    pub fn with_updates(self, updates: Vec<Update>) -> Self {
        *lock(&self.updates) = updates;
        self
    }

    /// Make `send_direct` fail
    pub fn fail_direct(self) -> Self {
        self.fail_direct.store(true, Ordering::SeqCst);
        self
    }

    /// Make every `reply` wait for a permit from `gate` before it is recorded
    pub fn gate_replies(&self, gate: Arc<Semaphore>) {
        *lock(&self.reply_gate) = Some(gate);
    }

    pub fn sent(&self) -> Vec<Sent> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.chat_id() == chat_id).collect()
    }

    /// Registered command menu
    pub fn commands(&self) -> Vec<(String, String)> {
        lock(&self.commands).clone()
    }

    /// Wait until at least `count` sends were recorded. Returns false on timeout.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if lock(&self.sent).len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn record(&self, sent: Sent) {
        lock(&self.sent).push(sent);
        self.notify.notify_waiters();
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagingPlatform for MockPlatform {
    async fn update_stream(&self) -> Result<UpdateStream> {
        let updates = std::mem::take(&mut *lock(&self.updates));
        Ok(Box::pin(tokio_stream::iter(updates)))
    }

    async fn reply(
        &self,
        chat_id: ChatId,
        reply_to_message_id: i32,
        text: &str,
        markdown: bool,
    ) -> Result<()> {
        let gate = lock(&self.reply_gate).clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        self.record(Sent::Reply {
            chat_id,
            reply_to: reply_to_message_id,
            text: text.to_string(),
            markdown,
        });
        Ok(())
    }

    async fn send_direct(&self, chat_id: ChatId, text: &str) -> Result<()> {
        if self.fail_direct.load(Ordering::SeqCst) {
            anyhow::bail!("direct send to {} failed", chat_id);
        }
        self.record(Sent::Direct {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_image(&self, chat_id: ChatId, url: &str, caption: &str) -> Result<()> {
        self.record(Sent::Image {
            chat_id,
            url: url.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn register_commands(&self, commands: &[(&'static str, &'static str)]) -> Result<()> {
        *lock(&self.commands) = commands
            .iter()
            .map(|(n, d)| (n.to_string(), d.to_string()))
            .collect();
        Ok(())
    }

    fn bot_username(&self) -> &str {
        MOCK_BOT_USERNAME
    }

    fn bot_user_id(&self) -> i64 {
        MOCK_BOT_ID
    }

    fn platform_id(&self) -> &'static str {
        "mock"
    }
}

/// Handles to everything a test context is built from
pub struct TestHarness {
    pub ctx: Arc<BotContext>,
    pub platform: MockPlatform,
    pub backend: MockBackend,
    pub store: Arc<MemoryChatStore>,
}

impl TestHarness {
    /// Context over a mock platform, the given backend and a fresh memory store.
    /// Transcripts go to `config.storage.data_dir`, so point it at a temp dir.
    pub fn new(config: Config, backend: MockBackend) -> Self {
        let platform = MockPlatform::new();
        let store = Arc::new(MemoryChatStore::new());
        let ctx = Arc::new(BotContext::new(
            config,
            Arc::new(platform.clone()),
            Arc::new(backend.clone()),
            store.clone(),
        ));
        Self {
            ctx,
            platform,
            backend,
            store,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
