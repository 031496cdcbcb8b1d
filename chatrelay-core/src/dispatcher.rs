// ABOUTME: Update Dispatcher: filters updates, creates chats lazily, enforces access, enqueues.
// ABOUTME: Runs on a single task; blocking on a full queue is the pipeline's backpressure.

use crate::context::BotContext;
use crate::metrics;
use crate::pool::WorkQueue;
use crate::traits::{IncomingMessage, Update, UpdateStream};
use anyhow::Result;
use std::sync::Arc;
use tokio_stream::StreamExt;

pub const REFUSAL_TEXT: &str = "Sorry, you do not have access to this bot.";

/// What happened to one update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No message payload
    Discarded,
    /// Unauthorized sender in a private chat, refusal sent
    Refused,
    /// Unauthorized sender in a group chat, dropped silently
    Dropped,
    Enqueued,
}

impl DispatchOutcome {
    fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Discarded => "discarded",
            DispatchOutcome::Refused => "refused",
            DispatchOutcome::Dropped => "dropped",
            DispatchOutcome::Enqueued => "enqueued",
        }
    }
}

pub struct Dispatcher {
    ctx: Arc<BotContext>,
    queue: WorkQueue,
}

impl Dispatcher {
    pub fn new(ctx: Arc<BotContext>, queue: WorkQueue) -> Self {
        Self { ctx, queue }
    }

    /// Consume the update stream until it ends or the queue closes.
    /// Dropping the dispatcher closes the queue so workers can drain and exit.
    pub async fn run(self, mut updates: UpdateStream) -> Result<()> {
        tracing::info!("Dispatcher started");
        while let Some(update) = updates.next().await {
            self.dispatch(update).await?;
        }
        tracing::info!("Update stream ended, dispatcher stopping");
        Ok(())
    }

    /// Route one update. Returns an error only when the work queue is closed.
    pub async fn dispatch(&self, update: Update) -> Result<DispatchOutcome> {
        let outcome = self.route(update).await?;
        metrics::record_dispatch(outcome.as_str());
        Ok(outcome)
    }

    async fn route(&self, update: Update) -> Result<DispatchOutcome> {
        let Some(msg) = update.message else {
            tracing::debug!(update_id = update.update_id, "Discarding update without message");
            metrics::record_update_received("empty");
            return Ok(DispatchOutcome::Discarded);
        };
        metrics::record_update_received(if msg.is_command() { "command" } else { "message" });

        // Idempotent: concurrent first messages for a chat end up with one record
        let default_chat = self.ctx.default_chat(msg.chat_id);
        if let Err(e) = self.ctx.store.get_or_insert(default_chat) {
            tracing::error!(chat_id = %msg.chat_id, error = %e, "Failed to initialize chat");
            metrics::record_error("chat_init");
        }

        if !msg.is_command() {
            self.ctx.transcripts.record(&msg).await;
        }

        if !self.ctx.config.access.is_authorized(msg.sender.id) {
            return Ok(self.refuse(&msg).await);
        }

        self.queue.enqueue(msg).await?;
        Ok(DispatchOutcome::Enqueued)
    }

    async fn refuse(&self, msg: &IncomingMessage) -> DispatchOutcome {
        if !msg.is_private {
            tracing::debug!(
                chat_id = %msg.chat_id,
                sender_id = msg.sender.id,
                "Dropping group message from unauthorized sender"
            );
            return DispatchOutcome::Dropped;
        }

        tracing::warn!(
            chat_id = %msg.chat_id,
            sender_id = msg.sender.id,
            "Unauthorized access attempt"
        );
        if let Err(e) = self
            .ctx
            .platform
            .reply(msg.chat_id, msg.message_id, REFUSAL_TEXT, false)
            .await
        {
            tracing::warn!(chat_id = %msg.chat_id, error = %e, "Failed to send refusal");
        }

        let notice = format!(
            "Unauthorized access attempt by user {}: {} ({})",
            msg.sender.id,
            msg.sender.display_name(),
            msg.sender.username_or_empty()
        );
        self.ctx.notify_admin(&notice).await;
        DispatchOutcome::Refused
    }
}
