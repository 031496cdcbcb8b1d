// ABOUTME: Outbound side of the Telegram adapter for a single chat.
// ABOUTME: Splits long text at 4096 chars and retries legacy-Markdown sends as plain text.

use anyhow::{Context, Result};
use chatrelay_core::utils::{chunk_message, MAX_MESSAGE_LENGTH};
use teloxide::payloads::{SendMessageSetters, SendPhotoSetters};
use teloxide::prelude::{Bot, Requester};
use teloxide::types::{ChatId, InputFile, MessageId, ParseMode, ReplyParameters};

/// Telegram's legacy Markdown parse mode
#[allow(deprecated)]
const LEGACY_MARKDOWN: ParseMode = ParseMode::Markdown;

/// A Telegram chat the bot writes into
#[derive(Debug, Clone)]
pub struct TelegramChannel {
    chat_id: ChatId,
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(chat_id: ChatId, bot: Bot) -> Self {
        Self { chat_id, bot }
    }

    /// Send `text` in chunks; the first one replies to `reply_to` when given.
    /// With `markdown`, a chunk Telegram rejects is resent without formatting.
    pub async fn send_text(&self, text: &str, reply_to: Option<i32>, markdown: bool) -> Result<()> {
        for (i, chunk) in chunk_message(text, MAX_MESSAGE_LENGTH).into_iter().enumerate() {
            let reply_to = if i == 0 { reply_to } else { None };
            if markdown {
                match self.send_chunk(&chunk, reply_to, true).await {
                    Ok(()) => continue,
                    Err(e) => {
                        tracing::debug!(
                            chat_id = self.chat_id.0,
                            error = %e,
                            "Markdown send rejected, retrying as plain text"
                        );
                    }
                }
            }
            self.send_chunk(&chunk, reply_to, false)
                .await
                .context("Failed to send message")?;
        }
        Ok(())
    }

    async fn send_chunk(&self, chunk: &str, reply_to: Option<i32>, markdown: bool) -> Result<()> {
        let mut req = self.bot.send_message(self.chat_id, chunk);
        if let Some(id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        if markdown {
            req = req.parse_mode(LEGACY_MARKDOWN);
        }
        req.await?;
        Ok(())
    }

    /// Send a photo by URL with a caption
    pub async fn send_image(&self, url: &str, caption: &str) -> Result<()> {
        let url = url::Url::parse(url).with_context(|| format!("Invalid image URL: {}", url))?;
        let mut req = self.bot.send_photo(self.chat_id, InputFile::url(url));
        if !caption.is_empty() {
            req = req.caption(caption);
        }
        req.await.context("Failed to send photo")?;
        Ok(())
    }
}
