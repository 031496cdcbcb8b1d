// ABOUTME: Platform adapters for chatrelay.
// ABOUTME: Re-exports the Telegram implementation of MessagingPlatform.

pub mod telegram;

pub use telegram::{TelegramChannel, TelegramPlatform};
