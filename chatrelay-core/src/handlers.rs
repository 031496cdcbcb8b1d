// ABOUTME: Handlers for the closed command set, dispatched with an exhaustive match on CommandKind.
// ABOUTME: State-changing commands run under the chat lock; one-shot helpers never touch history.

use crate::assembler;
use crate::chat::{Chat, ChatId};
use crate::commands::{Command, CommandKind, COMMAND_TABLE};
use crate::context::BotContext;
use crate::conversation::{request_completion, CompletionReply};
use crate::locks::ChatGuard;
use crate::metrics;
use crate::traits::IncomingMessage;
use crate::utils::{chunk_message, MAX_MESSAGE_LENGTH};
use anyhow::Result;
use chatrelay_llm::Message;
use chrono::{DateTime, Utc};

pub const START_TEXT: &str = "Hi! I'm an AI assistant. Send me a message and I'll do my best to help.\nUse /help to see what else I can do.";

const EMPTY_HISTORY_TEXT: &str = "Conversation history is empty.";

/// Temperature for translate/grammar/enhance/summarize
const ONE_SHOT_TEMPERATURE: f32 = 0.6;
const CAPTION_TEMPERATURE: f32 = 0.7;

/// Transcript lines fed to /summarize
const SUMMARY_LINES: usize = 100;

const TRANSLATE_PROMPT: &str = "You are a translator. Translate the user's text into English. If the text is already in English, translate it into Russian. Reply with the translation only.";
const GRAMMAR_PROMPT: &str = "You are a proofreader. Correct the grammar, spelling and punctuation of the user's text without changing its meaning. Reply with the corrected text only.";
const ENHANCE_PROMPT: &str = "You are an editor. Rewrite the user's text so it reads clearly and naturally while keeping its meaning and language. Reply with the improved text only.";
const SUMMARIZE_PROMPT: &str = "You summarize chat logs. Write a short summary of the main topics and conclusions of the conversation below, in the language the conversation is written in.";
const CAPTION_PROMPT: &str = "Write a single short, vivid sentence describing an image generated from the user's description. Reply with the sentence only.";

/// Execute a parsed command. Unknown commands are ignored.
pub async fn handle_command(ctx: &BotContext, msg: &IncomingMessage, cmd: &Command) -> Result<()> {
    let Some(kind) = cmd.kind() else {
        tracing::debug!(chat_id = %msg.chat_id, command = %cmd.name, "Ignoring unknown command");
        return Ok(());
    };
    metrics::record_command(kind.name());
    tracing::info!(
        chat_id = %msg.chat_id,
        sender_id = msg.sender.id,
        command = kind.name(),
        "Handling command"
    );

    let guard = ctx.locks.lock(msg.chat_id).await;
    let mut chat = ctx.load_chat(msg.chat_id)?;

    match kind {
        CommandKind::Start => respond(ctx, msg, START_TEXT).await,
        CommandKind::Help => respond(ctx, msg, &help_text()).await,
        CommandKind::Clear => {
            chat.clear_history();
            ctx.store.upsert(&chat)?;
            respond(ctx, msg, "Conversation history cleared.").await;
        }
        CommandKind::History => {
            drop(guard);
            for chunk in chunk_message(&format_history(&chat), MAX_MESSAGE_LENGTH) {
                respond(ctx, msg, &chunk).await;
            }
        }
        CommandKind::Rollback => rollback(ctx, msg, cmd, &mut chat).await?,
        CommandKind::Temperature => temperature(ctx, msg, cmd, &mut chat).await?,
        CommandKind::Model => model(ctx, msg, cmd, &mut chat).await?,
        CommandKind::System => system_prompt(ctx, msg, cmd, &mut chat).await?,
        CommandKind::Markdown => markdown(ctx, msg, cmd, &mut chat).await?,
        CommandKind::Translate => {
            drop(guard);
            rewrite(ctx, msg, cmd, &chat, kind, TRANSLATE_PROMPT).await;
        }
        CommandKind::Grammar => {
            drop(guard);
            rewrite(ctx, msg, cmd, &chat, kind, GRAMMAR_PROMPT).await;
        }
        CommandKind::Enhance => {
            drop(guard);
            rewrite(ctx, msg, cmd, &chat, kind, ENHANCE_PROMPT).await;
        }
        CommandKind::Summarize => {
            drop(guard);
            summarize(ctx, msg, &chat).await?;
        }
        CommandKind::Imagine => imagine(ctx, msg, cmd, chat, guard).await?,
    }
    Ok(())
}

/// Reply to the command message; delivery failures are logged
async fn respond(ctx: &BotContext, msg: &IncomingMessage, text: &str) {
    match ctx.platform.reply(msg.chat_id, msg.message_id, text, false).await {
        Ok(()) => metrics::record_message_sent(),
        Err(e) => {
            tracing::error!(chat_id = %msg.chat_id, error = %e, "Failed to send command reply");
            metrics::record_error("reply_delivery");
        }
    }
}

pub fn help_text() -> String {
    let mut text = String::from("Available commands:\n");
    for (name, _, description) in COMMAND_TABLE {
        text.push_str(&format!("/{} - {}\n", name, description));
    }
    text
}

/// Numbered "N. Role: content" lines for the stored conversation
pub fn format_history(chat: &Chat) -> String {
    let lines: Vec<String> = assembler::transcript(&chat.history)
        .enumerate()
        .map(|(i, m)| format!("{}. {}: {}", i + 1, m.role, m.content))
        .collect();
    if lines.is_empty() {
        EMPTY_HISTORY_TEXT.to_string()
    } else {
        lines.join("\n")
    }
}

async fn rollback(
    ctx: &BotContext,
    msg: &IncomingMessage,
    cmd: &Command,
    chat: &mut Chat,
) -> Result<()> {
    let count = match cmd.first_arg() {
        None => 1,
        Some(arg) => match arg.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                respond(ctx, msg, "Usage: /rollback [number of exchanges]").await;
                return Ok(());
            }
        },
    };
    let removed = chat.rollback(count);
    if removed > 0 {
        ctx.store.upsert(chat)?;
    }
    respond(ctx, msg, &format!("Removed {} exchange(s) from history.", removed)).await;
    Ok(())
}

async fn temperature(
    ctx: &BotContext,
    msg: &IncomingMessage,
    cmd: &Command,
    chat: &mut Chat,
) -> Result<()> {
    let Some(arg) = cmd.first_arg() else {
        let text = format!("Current temperature: {}", chat.settings.temperature);
        respond(ctx, msg, &text).await;
        return Ok(());
    };
    match arg.replace(',', ".").parse::<f32>() {
        Ok(value) if (0.0..=2.0).contains(&value) => {
            chat.settings.temperature = value;
            ctx.store.upsert(chat)?;
            respond(ctx, msg, &format!("Temperature set to {}.", value)).await;
        }
        _ => {
            respond(ctx, msg, "Temperature must be a number between 0.0 and 2.0.").await;
        }
    }
    Ok(())
}

async fn model(ctx: &BotContext, msg: &IncomingMessage, cmd: &Command, chat: &mut Chat) -> Result<()> {
    let Some(name) = cmd.first_arg() else {
        let text = format!("Current model: {}", chat.settings.model);
        respond(ctx, msg, &text).await;
        return Ok(());
    };
    chat.settings.model = name.to_string();
    ctx.store.upsert(chat)?;
    respond(ctx, msg, &format!("Model set to {}.", name)).await;
    Ok(())
}

async fn system_prompt(
    ctx: &BotContext,
    msg: &IncomingMessage,
    cmd: &Command,
    chat: &mut Chat,
) -> Result<()> {
    let arg = cmd.raw_args.trim();
    if arg.is_empty() {
        let text = if chat.settings.system_prompt.is_empty() {
            "No system prompt is set.".to_string()
        } else {
            format!("Current system prompt:\n{}", chat.settings.system_prompt)
        };
        respond(ctx, msg, &text).await;
        return Ok(());
    }

    if arg.eq_ignore_ascii_case("clear") {
        chat.settings.system_prompt.clear();
        ctx.store.upsert(chat)?;
        respond(ctx, msg, "System prompt cleared.").await;
    } else {
        chat.settings.system_prompt = arg.to_string();
        ctx.store.upsert(chat)?;
        respond(ctx, msg, "System prompt updated.").await;
    }
    Ok(())
}

async fn markdown(
    ctx: &BotContext,
    msg: &IncomingMessage,
    cmd: &Command,
    chat: &mut Chat,
) -> Result<()> {
    let value = match cmd.first_arg().map(|a| a.to_lowercase()) {
        None => {
            let state = if chat.settings.use_markdown { "on" } else { "off" };
            respond(ctx, msg, &format!("Markdown replies are {}.", state)).await;
            return Ok(());
        }
        Some(arg) => match arg.as_str() {
            "on" | "true" | "1" => true,
            "off" | "false" | "0" => false,
            _ => {
                respond(ctx, msg, "Usage: /markdown on|off").await;
                return Ok(());
            }
        },
    };
    chat.settings.use_markdown = value;
    ctx.store.upsert(chat)?;
    let state = if value { "enabled" } else { "disabled" };
    respond(ctx, msg, &format!("Markdown replies {}.", state)).await;
    Ok(())
}

/// Run a single completion outside the conversation history.
/// Returns `None` when the provider could not be reached.
async fn one_shot(
    ctx: &BotContext,
    chat: &Chat,
    system: &str,
    text: &str,
    temperature: f32,
) -> Option<CompletionReply> {
    let messages = vec![Message::system(system), Message::user(text)];
    match request_completion(
        ctx.completion.as_ref(),
        &messages,
        &chat.settings.model,
        temperature,
    )
    .await
    {
        Ok(reply) => Some(reply),
        Err(e) => {
            tracing::error!(chat_id = %chat.chat_id, error = %e, "One-shot completion failed");
            metrics::record_error("completion_transport");
            None
        }
    }
}

async fn rewrite(
    ctx: &BotContext,
    msg: &IncomingMessage,
    cmd: &Command,
    chat: &Chat,
    kind: CommandKind,
    system: &str,
) {
    let replied_text = msg.reply_to.as_ref().and_then(|r| r.text.as_deref());
    let text = match cmd.raw_args.trim() {
        "" => replied_text.map(str::trim).unwrap_or_default(),
        args => args,
    };
    if text.is_empty() {
        let usage = format!(
            "Usage: /{0} <text>, or reply to a message with /{0}",
            kind.name()
        );
        respond(ctx, msg, &usage).await;
        return;
    }

    if let Some(reply) = one_shot(ctx, chat, system, text, ONE_SHOT_TEMPERATURE).await {
        respond(ctx, msg, reply.text()).await;
    }
}

async fn summarize(ctx: &BotContext, msg: &IncomingMessage, chat: &Chat) -> Result<()> {
    let lines = ctx.transcripts.tail(msg.chat_id, SUMMARY_LINES).await?;
    if lines.is_empty() {
        respond(ctx, msg, "Nothing to summarize yet.").await;
        return Ok(());
    }
    let transcript = lines.join("\n");
    if let Some(reply) = one_shot(ctx, chat, SUMMARIZE_PROMPT, &transcript, ONE_SHOT_TEMPERATURE).await {
        respond(ctx, msg, reply.text()).await;
    }
    Ok(())
}

async fn imagine(
    ctx: &BotContext,
    msg: &IncomingMessage,
    cmd: &Command,
    mut chat: Chat,
    guard: ChatGuard,
) -> Result<()> {
    let prompt = cmd.raw_args.trim();
    if prompt.is_empty() {
        respond(ctx, msg, "Usage: /imagine <description of the image>").await;
        return Ok(());
    }

    let now = Utc::now();
    if !chat.image_generation_allowed(now) && !ctx.config.access.is_admin(msg.sender.id) {
        let wait = (chat.next_image_gen_allowed_at - now).num_seconds().max(1);
        let text = format!("Please wait {} seconds before generating another image.", wait);
        respond(ctx, msg, &text).await;
        return Ok(());
    }

    let cooldown = chrono::Duration::from_std(ctx.config.images.cooldown())
        .unwrap_or(chrono::Duration::MAX);
    chat.next_image_gen_allowed_at = now
        .checked_add_signed(cooldown)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    ctx.store.upsert(&chat)?;
    drop(guard);

    let url = match ctx
        .completion
        .generate_image(prompt, ctx.config.images.size)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(chat_id = %msg.chat_id, error = %e, "Image generation failed");
            metrics::record_error("image_generation");
            return Ok(());
        }
    };

    let caption = match one_shot(ctx, &chat, CAPTION_PROMPT, prompt, CAPTION_TEMPERATURE).await {
        Some(CompletionReply::Generated(text)) => text,
        _ => prompt.to_string(),
    };

    if let Err(e) = ctx.platform.send_image(msg.chat_id, &url, &caption).await {
        tracing::error!(chat_id = %msg.chat_id, error = %e, "Failed to send image");
        metrics::record_error("image_delivery");
    }

    if let Some(admin_id) = ctx.config.access.admin_id {
        if msg.chat_id != ChatId(admin_id) {
            let notice = format!(
                "[Image by {} ({}, ID: {})] {}\n{}",
                msg.sender.display_name(),
                msg.sender.username_or_empty(),
                msg.sender.id,
                prompt,
                url
            );
            ctx.notify_admin(&notice).await;
        }
    }
    Ok(())
}
