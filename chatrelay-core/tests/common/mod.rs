// ABOUTME: Shared fixtures for chatrelay-core integration tests.
// ABOUTME: Builds configs rooted in a temp dir and canned senders and messages.

#![allow(dead_code)]

use chatrelay_core::commands::parse_message;
use chatrelay_core::testing::MOCK_BOT_USERNAME;
use chatrelay_core::{ChatId, Config, IncomingMessage, Sender};
use tempfile::TempDir;

pub const ADMIN_ID: i64 = 999;
pub const GROUP: ChatId = ChatId(-100123);

/// Config whose data dir lives in `dir`
pub fn config_in(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.telegram.bot_token = "test-token".to_string();
    config.completion.provider = "mock".to_string();
    config.storage.data_dir = dir.path().to_string_lossy().into_owned();
    config
}

pub fn alice() -> Sender {
    Sender::new(7, "Alice").with_username("alice")
}

pub fn bob() -> Sender {
    Sender::new(8, "Bob").with_last_name("Stone")
}

pub fn admin() -> Sender {
    Sender::new(ADMIN_ID, "Admin").with_username("boss")
}

pub fn private(sender: Sender, message_id: i32, text: &str) -> IncomingMessage {
    IncomingMessage::private(sender, message_id, text)
}

pub fn group(sender: Sender, message_id: i32, text: &str) -> IncomingMessage {
    IncomingMessage::group(GROUP, sender, message_id, text)
}

/// Message carrying the parsed command for `text`
pub fn command(msg: IncomingMessage) -> IncomingMessage {
    let cmd = parse_message(&msg.text, MOCK_BOT_USERNAME)
        .as_command()
        .cloned()
        .expect("text should parse as a command");
    msg.with_command(cmd)
}
