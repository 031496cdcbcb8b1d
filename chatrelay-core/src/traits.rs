// ABOUTME: Platform abstraction for the relay: inbound updates and outbound delivery.
// ABOUTME: Core pipeline code depends on MessagingPlatform only, never on a concrete SDK.

use crate::chat::ChatId;
use crate::commands::Command;
use anyhow::Result;
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

// =============================================================================
// User Identity
// =============================================================================

/// Identity of the user who sent a message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sender {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl Sender {
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: None,
            username: None,
        }
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// "First Last", or just "First" when there is no last name
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref().filter(|l| !l.is_empty()) {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    /// Handle without the leading @, empty when the user has none
    pub fn username_or_empty(&self) -> &str {
        self.username.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Incoming Message
// =============================================================================

/// The message a user replied to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyTo {
    pub message_id: i32,
    /// Author of the replied-to message, when the platform exposes it
    pub sender_id: Option<i64>,
    pub text: Option<String>,
}

/// Message payload of an update
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub message_id: i32,
    /// One-to-one conversation with the bot
    pub is_private: bool,
    pub sender: Sender,
    /// Message text; empty for non-text messages
    pub text: String,
    /// Parsed slash command, when the text is one
    pub command: Option<Command>,
    pub reply_to: Option<ReplyTo>,
}

impl IncomingMessage {
    /// Plain text message in a private chat whose id equals the sender id
    pub fn private(sender: Sender, message_id: i32, text: impl Into<String>) -> Self {
        Self {
            chat_id: ChatId(sender.id),
            message_id,
            is_private: true,
            sender,
            text: text.into(),
            command: None,
            reply_to: None,
        }
    }

    /// Plain text message in a group chat
    pub fn group(chat_id: ChatId, sender: Sender, message_id: i32, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id,
            is_private: false,
            sender,
            text: text.into(),
            command: None,
            reply_to: None,
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_reply_to(mut self, reply_to: ReplyTo) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }
}

/// One inbound event from the platform
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub update_id: i64,
    /// `None` for events that carry no message (edits, joins, callbacks, ...)
    pub message: Option<IncomingMessage>,
}

impl Update {
    pub fn message(update_id: i64, message: IncomingMessage) -> Self {
        Self {
            update_id,
            message: Some(message),
        }
    }

    pub fn empty(update_id: i64) -> Self {
        Self {
            update_id,
            message: None,
        }
    }
}

// =============================================================================
// Messaging Platform
// =============================================================================

/// Boxed stream type for platform updates
pub type UpdateStream = Pin<Box<dyn Stream<Item = Update> + Send>>;

/// Platform interface the relay pipeline runs against.
///
/// The update stream is pull-based: an implementation must not fetch more
/// updates from its upstream while the consumer is not polling.
#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    /// Receive inbound updates as a stream
    async fn update_stream(&self) -> Result<UpdateStream>;

    /// Send `text` into `chat_id` as a reply to `reply_to_message_id`
    async fn reply(
        &self,
        chat_id: ChatId,
        reply_to_message_id: i32,
        text: &str,
        markdown: bool,
    ) -> Result<()>;

    /// Send a standalone plain-text message
    async fn send_direct(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Send an image by URL with a caption
    async fn send_image(&self, chat_id: ChatId, url: &str, caption: &str) -> Result<()>;

    /// Publish the command menu (name, description). Platforms without one ignore it.
    async fn register_commands(&self, _commands: &[(&'static str, &'static str)]) -> Result<()> {
        Ok(())
    }

    /// Bot's handle without the leading @
    fn bot_username(&self) -> &str;

    /// Bot's own user ID on this platform
    fn bot_user_id(&self) -> i64;

    /// Platform identifier (e.g., "telegram")
    fn platform_id(&self) -> &'static str;

    /// Gracefully shut down the platform connection
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
