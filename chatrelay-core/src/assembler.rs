// ABOUTME: Conversation assembly: group-chat gating, bounded history and message list building.
// ABOUTME: Pure functions over Chat state; no I/O happens here.

use crate::chat::{Chat, ChatSettings, ConversationEntry};
use crate::traits::IncomingMessage;
use chatrelay_llm::Message;

/// Decide whether the bot should answer a plain (non-command) message.
///
/// Private chats always engage. In group chats the message must mention
/// `@bot_username` or reply to one of the bot's own messages. Returns the
/// prompt text to use (mentions stripped, trimmed), or `None` to ignore.
/// An empty prompt is ignored too.
pub fn engage(msg: &IncomingMessage, bot_username: &str, bot_user_id: i64) -> Option<String> {
    let text = if msg.chat_id.is_group() {
        let mention = format!("@{}", bot_username);
        let mentioned = !bot_username.is_empty() && msg.text.contains(&mention);
        let replied_to_bot = msg
            .reply_to
            .as_ref()
            .and_then(|r| r.sender_id)
            .is_some_and(|id| id == bot_user_id);

        if !mentioned && !replied_to_bot {
            return None;
        }
        if mentioned {
            msg.text.replace(&mention, "")
        } else {
            msg.text.clone()
        }
    } else {
        msg.text.clone()
    };

    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Append a pending entry for `prompt` and trim history to the chat's bound
pub fn append_turn(chat: &mut Chat, prompt: impl Into<String>) {
    chat.history.push(ConversationEntry::pending(prompt));
    trim_history(&mut chat.history, chat.settings.max_history);
}

/// Remove oldest entries until at most `max_history` remain.
///
/// A bound of zero is treated as one so the newest entry always survives.
/// Returns the number of entries evicted.
pub fn trim_history(history: &mut Vec<ConversationEntry>, max_history: usize) -> usize {
    let bound = max_history.max(1);
    let excess = history.len().saturating_sub(bound);
    if excess > 0 {
        history.drain(..excess);
    }
    excess
}

/// Build the ordered message list sent to the completion provider:
/// the system prompt (when set), then each entry's prompt followed by its
/// response when that response is non-empty.
pub fn assemble(settings: &ChatSettings, history: &[ConversationEntry]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);
    if !settings.system_prompt.trim().is_empty() {
        messages.push(Message::system(settings.system_prompt.clone()));
    }
    messages.extend(transcript(history));
    messages
}

/// The conversation alone, without the system prompt
pub fn transcript(history: &[ConversationEntry]) -> impl Iterator<Item = Message> + '_ {
    history.iter().flat_map(|entry| {
        let response = entry.response.as_ref().filter(|r| !r.is_blank()).cloned();
        std::iter::once(entry.prompt.clone()).chain(response)
    })
}
