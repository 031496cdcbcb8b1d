// ABOUTME: Telegram platform implementation of MessagingPlatform using teloxide long polling.
// ABOUTME: Converts Telegram updates into relay updates and sends replies, notices and images.

pub mod channel;

pub use channel::TelegramChannel;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chatrelay_core::commands::{parse_message, ParseResult};
use chatrelay_core::config::TelegramConfig;
use chatrelay_core::traits::{
    IncomingMessage, MessagingPlatform, ReplyTo, Sender, Update, UpdateStream,
};
use chatrelay_core::ChatId;
use std::sync::Mutex;
use std::time::Duration;
use teloxide::prelude::{Bot, Requester};
use teloxide::payloads::GetUpdatesSetters;
use teloxide::types::{BotCommand, Message, UpdateKind, User};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram platform implementation using teloxide with long polling
pub struct TelegramPlatform {
    bot: Bot,
    bot_user_id: i64,
    bot_username: String,
    poll_timeout_secs: u32,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramPlatform {
    /// Create a new TelegramPlatform from config.
    ///
    /// Resolves the bot's identity via the `getMe` API call.
    pub async fn new(config: &TelegramConfig) -> Result<Self> {
        // The HTTP timeout must outlast a long poll
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        let bot = Bot::with_client(&config.bot_token, client);

        let me = bot.get_me().await.context("Failed to call Telegram getMe")?;
        let bot_username = me.username().to_string();
        let bot_user_id = me.id.0 as i64;

        tracing::info!(
            bot_username = %bot_username,
            bot_id = bot_user_id,
            "Telegram bot authenticated"
        );

        Ok(Self {
            bot,
            bot_user_id,
            bot_username,
            poll_timeout_secs: config.poll_timeout_secs,
            poller: Mutex::new(None),
        })
    }

    fn channel(&self, chat_id: ChatId) -> TelegramChannel {
        TelegramChannel::new(teloxide::types::ChatId(chat_id.0), self.bot.clone())
    }
}

#[async_trait]
impl MessagingPlatform for TelegramPlatform {
    async fn update_stream(&self) -> Result<UpdateStream> {
        // Capacity 1: the poller fetches the next batch only as the dispatcher consumes
        let (tx, rx) = mpsc::channel(1);
        let bot = self.bot.clone();
        let bot_username = self.bot_username.clone();
        let bot_user_id = self.bot_user_id;
        let timeout = self.poll_timeout_secs;

        let handle = tokio::spawn(async move {
            let mut offset: i32 = 0;

            loop {
                let updates = match bot.get_updates().offset(offset).timeout(timeout).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::warn!(
                            platform = "telegram",
                            error = %e,
                            "Long polling error, retrying in 5s"
                        );
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in updates {
                    offset = update.id.as_offset();
                    let converted = convert_update(&update, &bot_username, bot_user_id);
                    if tx.send(converted).await.is_err() {
                        tracing::info!(platform = "telegram", "Update stream receiver dropped");
                        return;
                    }
                }
            }
        });

        if let Ok(mut poller) = self.poller.lock() {
            if let Some(previous) = poller.replace(handle) {
                previous.abort();
            }
        }

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn reply(
        &self,
        chat_id: ChatId,
        reply_to_message_id: i32,
        text: &str,
        markdown: bool,
    ) -> Result<()> {
        self.channel(chat_id)
            .send_text(text, Some(reply_to_message_id), markdown)
            .await
    }

    async fn send_direct(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.channel(chat_id).send_text(text, None, false).await
    }

    async fn send_image(&self, chat_id: ChatId, url: &str, caption: &str) -> Result<()> {
        self.channel(chat_id).send_image(url, caption).await
    }

    async fn register_commands(&self, commands: &[(&'static str, &'static str)]) -> Result<()> {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|(name, description)| BotCommand::new(*name, *description))
            .collect();
        self.bot
            .set_my_commands(commands)
            .await
            .context("Failed to register bot commands")?;
        Ok(())
    }

    fn bot_username(&self) -> &str {
        &self.bot_username
    }

    fn bot_user_id(&self) -> i64 {
        self.bot_user_id
    }

    fn platform_id(&self) -> &'static str {
        "telegram"
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!(platform = "telegram", "Shutting down Telegram platform");
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                handle.abort();
            }
        }
        Ok(())
    }
}

/// Convert a Telegram update. Anything that is not a text message from
/// another user becomes an update without a message.
pub fn convert_update(update: &teloxide::types::Update, bot_username: &str, bot_user_id: i64) -> Update {
    let update_id = i64::from(update.id.0);
    let message = match &update.kind {
        UpdateKind::Message(message) => convert_message(message, bot_username, bot_user_id),
        _ => None,
    };
    Update { update_id, message }
}

fn convert_message(message: &Message, bot_username: &str, bot_user_id: i64) -> Option<IncomingMessage> {
    let text = message.text()?;
    let from = message.from.as_ref()?;
    if from.id.0 as i64 == bot_user_id {
        return None;
    }

    let command = match parse_message(text, bot_username) {
        ParseResult::Command(cmd) => Some(cmd),
        ParseResult::Message(_) => None,
        ParseResult::Ignore => {
            tracing::debug!(chat_id = message.chat.id.0, "Ignoring command addressed to another bot");
            return None;
        }
    };

    let reply_to = message.reply_to_message().map(|original| ReplyTo {
        message_id: original.id.0,
        sender_id: original.from.as_ref().map(|u| u.id.0 as i64),
        text: original.text().map(str::to_string),
    });

    Some(IncomingMessage {
        chat_id: ChatId(message.chat.id.0),
        message_id: message.id.0,
        is_private: message.chat.is_private(),
        sender: convert_user(from),
        text: text.to_string(),
        command,
        reply_to,
    })
}

fn convert_user(user: &User) -> Sender {
    let mut sender = Sender::new(user.id.0 as i64, user.first_name.clone());
    if let Some(last) = &user.last_name {
        sender = sender.with_last_name(last.clone());
    }
    if let Some(username) = &user.username {
        sender = sender.with_username(username.clone());
    }
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BOT: &str = "relay_bot";
    const BOT_ID: i64 = 4242;

    fn parse(value: serde_json::Value) -> teloxide::types::Update {
        serde_json::from_str(&value.to_string()).unwrap()
    }

    fn private_update(text: &str) -> serde_json::Value {
        json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1700000000,
                "chat": {"id": 7, "type": "private", "first_name": "Alice"},
                "from": {"id": 7, "is_bot": false, "first_name": "Alice", "last_name": "Lee", "username": "alice"},
                "text": text
            }
        })
    }

    #[test]
    fn test_telegram_platform_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TelegramPlatform>();
        assert_send_sync::<TelegramChannel>();
    }

    #[test]
    fn test_private_text_message() {
        let update = convert_update(&parse(private_update("hello")), BOT, BOT_ID);
        assert_eq!(update.update_id, 10);

        let msg = update.message.unwrap();
        assert_eq!(msg.chat_id, ChatId(7));
        assert_eq!(msg.message_id, 5);
        assert!(msg.is_private);
        assert_eq!(msg.text, "hello");
        assert!(msg.command.is_none());
        assert_eq!(msg.sender.display_name(), "Alice Lee");
        assert_eq!(msg.sender.username_or_empty(), "alice");
    }

    #[test]
    fn test_command_is_parsed() {
        let update = convert_update(&parse(private_update("/temperature@relay_bot 0.5")), BOT, BOT_ID);
        let cmd = update.message.unwrap().command.unwrap();
        assert_eq!(cmd.name, "temperature");
        assert_eq!(cmd.first_arg(), Some("0.5"));
    }

    #[test]
    fn test_command_for_other_bot_has_no_message() {
        let update = convert_update(&parse(private_update("/start@other_bot")), BOT, BOT_ID);
        assert!(update.message.is_none());
    }

    #[test]
    fn test_message_from_bot_itself_has_no_message() {
        let update = parse(json!({
            "update_id": 13,
            "message": {
                "message_id": 22,
                "date": 1700000000,
                "chat": {"id": -100, "type": "group", "title": "Friends"},
                "from": {"id": 4242, "is_bot": true, "first_name": "Relay", "username": "relay_bot"},
                "text": "hello everyone"
            }
        }));
        assert!(convert_update(&update, BOT, BOT_ID).message.is_none());
    }

    #[test]
    fn test_group_reply_carries_original_sender() {
        let update = parse(json!({
            "update_id": 11,
            "message": {
                "message_id": 20,
                "date": 1700000000,
                "chat": {"id": -100, "type": "group", "title": "Friends"},
                "from": {"id": 8, "is_bot": false, "first_name": "Bob"},
                "text": "and then?",
                "reply_to_message": {
                    "message_id": 19,
                    "date": 1699999999,
                    "chat": {"id": -100, "type": "group", "title": "Friends"},
                    "from": {"id": 4242, "is_bot": true, "first_name": "Relay", "username": "relay_bot"},
                    "text": "once upon a time"
                }
            }
        }));

        let msg = convert_update(&update, BOT, BOT_ID).message.unwrap();
        assert!(!msg.is_private);
        assert_eq!(msg.chat_id, ChatId(-100));
        let reply_to = msg.reply_to.unwrap();
        assert_eq!(reply_to.message_id, 19);
        assert_eq!(reply_to.sender_id, Some(BOT_ID));
        assert_eq!(reply_to.text.as_deref(), Some("once upon a time"));
    }

    #[test]
    fn test_non_text_message_has_no_message() {
        let update = parse(json!({
            "update_id": 12,
            "message": {
                "message_id": 21,
                "date": 1700000000,
                "chat": {"id": 7, "type": "private", "first_name": "Alice"},
                "from": {"id": 7, "is_bot": false, "first_name": "Alice"},
                "sticker": {
                    "file_id": "abc",
                    "file_unique_id": "abc",
                    "type": "regular",
                    "width": 512,
                    "height": 512,
                    "is_animated": false,
                    "is_video": false,
                    "file_size": 100
                }
            }
        }));

        let converted = convert_update(&update, BOT, BOT_ID);
        assert_eq!(converted.update_id, 12);
        assert!(converted.message.is_none());
    }
}
