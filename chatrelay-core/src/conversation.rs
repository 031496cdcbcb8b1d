// ABOUTME: One conversational turn: gate, append, assemble, complete with retry, persist, reply.
// ABOUTME: Also owns the admin shadow-forward of finished turns.

use crate::assembler;
use crate::chat::ChatId;
use crate::context::BotContext;
use crate::metrics;
use crate::traits::{IncomingMessage, Sender};
use anyhow::Result;
use chatrelay_llm::{CompletionBackend, Message};
use std::sync::Arc;
use std::time::Instant;

/// Completion calls per turn when the provider keeps answering with no choices
pub const MAX_COMPLETION_ATTEMPTS: usize = 2;

/// Stored and sent when every attempt came back empty
pub const APOLOGY: &str =
    "Sorry, I couldn't get a response right now. Please try again later.";

/// Text produced for a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionReply {
    /// First non-empty choice, trimmed
    Generated(String),
    /// Every attempt returned zero choices
    Fallback,
}

impl CompletionReply {
    pub fn text(&self) -> &str {
        match self {
            CompletionReply::Generated(text) => text,
            CompletionReply::Fallback => APOLOGY,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CompletionReply::Fallback)
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Group message not addressed to the bot, or nothing to say
    Ignored,
    /// A response (generated or apology) was stored and sent
    Replied(CompletionReply),
    /// The provider could not be reached; the entry stays pending
    Abandoned,
}

/// Call the backend up to [`MAX_COMPLETION_ATTEMPTS`] times while it answers
/// with no choices. A transport error ends the attempt loop immediately.
pub async fn request_completion(
    backend: &dyn CompletionBackend,
    messages: &[Message],
    model: &str,
    temperature: f32,
) -> Result<CompletionReply> {
    for attempt in 1..=MAX_COMPLETION_ATTEMPTS {
        let completion = match backend.complete(messages, model, temperature).await {
            Ok(c) => c,
            Err(e) => {
                metrics::record_completion_attempt("error");
                return Err(e);
            }
        };
        if let Some(text) = completion.first_text() {
            metrics::record_completion_attempt("ok");
            return Ok(CompletionReply::Generated(text.to_string()));
        }
        metrics::record_completion_attempt("empty");
        tracing::warn!(
            attempt,
            max_attempts = MAX_COMPLETION_ATTEMPTS,
            model,
            "Completion returned no choices"
        );
    }
    Ok(CompletionReply::Fallback)
}

/// Run a plain (non-command) message through the conversation pipeline
pub async fn handle_message(ctx: &BotContext, msg: &IncomingMessage) -> Result<TurnOutcome> {
    let Some(prompt) = assembler::engage(
        msg,
        ctx.platform.bot_username(),
        ctx.platform.bot_user_id(),
    ) else {
        tracing::debug!(chat_id = %msg.chat_id, "Message not addressed to bot, ignoring");
        return Ok(TurnOutcome::Ignored);
    };

    let started = Instant::now();
    let guard = ctx.locks.lock(msg.chat_id).await;

    let mut chat = ctx.load_chat(msg.chat_id)?;
    assembler::append_turn(&mut chat, prompt);
    ctx.store.upsert(&chat)?;

    let messages = assembler::assemble(&chat.settings, &chat.history);
    tracing::debug!(
        chat_id = %msg.chat_id,
        messages = messages.len(),
        model = %chat.settings.model,
        "Requesting completion"
    );

    let reply = match request_completion(
        ctx.completion.as_ref(),
        &messages,
        &chat.settings.model,
        chat.settings.temperature,
    )
    .await
    {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(
                chat_id = %msg.chat_id,
                backend = ctx.completion.name(),
                error = %e,
                "Completion request failed, abandoning turn"
            );
            metrics::record_error("completion_transport");
            return Ok(TurnOutcome::Abandoned);
        }
    };

    if let Some(entry) = chat.history.last_mut() {
        entry.set_response(reply.text());
    }
    ctx.store.upsert(&chat)?;

    if let Err(e) = ctx
        .platform
        .reply(msg.chat_id, msg.message_id, reply.text(), chat.settings.use_markdown)
        .await
    {
        tracing::error!(chat_id = %msg.chat_id, error = %e, "Failed to deliver reply");
        metrics::record_error("reply_delivery");
    } else {
        metrics::record_message_sent();
    }
    drop(guard);

    forward_to_admin(ctx, msg, reply.text());

    metrics::record_turn_duration(started.elapsed());
    tracing::info!(
        chat_id = %msg.chat_id,
        sender_id = msg.sender.id,
        fallback = reply.is_fallback(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Turn completed"
    );
    Ok(TurnOutcome::Replied(reply))
}

/// Admin copy of a finished turn
pub fn format_admin_report(sender: &Sender, text: &str, response: &str) -> String {
    format!(
        "[User: {} ({}, ID: {})] {}\n[Assistant] {}\n",
        sender.display_name(),
        sender.username_or_empty(),
        sender.id,
        text,
        response
    )
}

/// Shadow-forward a turn to the admin in the background.
/// Skipped when no admin is configured, the sender is the admin, or the
/// sender is on the ignore-report list.
pub fn forward_to_admin(ctx: &BotContext, msg: &IncomingMessage, response: &str) {
    let Some(admin_id) = ctx.config.access.admin_id else {
        return;
    };
    if !ctx.config.access.should_report(&msg.sender) {
        return;
    }

    let report = format_admin_report(&msg.sender, &msg.text, response);
    let platform = Arc::clone(&ctx.platform);
    tokio::spawn(async move {
        if let Err(e) = platform.send_direct(ChatId(admin_id), &report).await {
            tracing::warn!(admin_id, error = %e, "Failed to forward turn to admin");
            metrics::record_error("admin_forward");
        }
    });
}
