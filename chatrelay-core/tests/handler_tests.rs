// ABOUTME: Integration tests for slash-command handlers.
// ABOUTME: Exercises settings commands, history editing, one-shot rewrites, summaries and image generation.

mod common;

use chatrelay_core::handlers::handle_command;
use chatrelay_core::testing::{Sent, TestHarness};
use chatrelay_core::{ChatId, ChatStore, ConversationEntry, IncomingMessage, ReplyTo};
use chatrelay_llm::backends::mock::{MockBackend, MockReply};
use chatrelay_llm::Role;
use common::*;
use tempfile::TempDir;

async fn run(h: &TestHarness, msg: IncomingMessage) {
    let msg = command(msg);
    let cmd = msg.command.clone().unwrap();
    handle_command(&h.ctx, &msg, &cmd).await.unwrap();
}

fn last_text(h: &TestHarness) -> String {
    h.platform.sent().last().map(|s| s.text().to_string()).unwrap_or_default()
}

fn seed_history(h: &TestHarness, chat_id: ChatId, count: usize) {
    let mut chat = h.ctx.default_chat(chat_id);
    for i in 0..count {
        let mut entry = ConversationEntry::pending(format!("q{}", i));
        entry.set_response(format!("a{}", i));
        chat.history.push(entry);
    }
    h.store.upsert(&chat).unwrap();
}

#[tokio::test]
async fn test_clear_empties_history() {
    let dir = TempDir::new().unwrap();
    let h = TestHarness::new(config_in(&dir), MockBackend::new());
    seed_history(&h, ChatId(7), 3);

    run(&h, private(alice(), 1, "/clear")).await;

    assert!(h.store.get(ChatId(7)).unwrap().unwrap().history.is_empty());
    assert_eq!(last_text(&h), "Conversation history cleared.");
}

#[tokio::test]
async fn test_rollback_removes_latest_exchanges() {
    let dir = TempDir::new().unwrap();
    let h = TestHarness::new(config_in(&dir), MockBackend::new());
    seed_history(&h, ChatId(7), 3);

    run(&h, private(alice(), 1, "/rollback 2")).await;

    let chat = h.store.get(ChatId(7)).unwrap().unwrap();
    assert_eq!(chat.history.len(), 1);
    assert_eq!(chat.history[0].prompt.content, "q0");
    assert_eq!(last_text(&h), "Removed 2 exchange(s) from history.");

    run(&h, private(alice(), 2, "/rollback nope")).await;
    assert_eq!(last_text(&h), "Usage: /rollback [number of exchanges]");
}

#[tokio::test]
async fn test_temperature_accepts_range_and_comma() {
    let dir = TempDir::new().unwrap();
    let h = TestHarness::new(config_in(&dir), MockBackend::new());

    run(&h, private(alice(), 1, "/temperature 1,5")).await;
    let chat = h.store.get(ChatId(7)).unwrap().unwrap();
    assert!((chat.settings.temperature - 1.5).abs() < f32::EPSILON);

    run(&h, private(alice(), 2, "/temperature 3")).await;
    assert_eq!(last_text(&h), "Temperature must be a number between 0.0 and 2.0.");
    let chat = h.store.get(ChatId(7)).unwrap().unwrap();
    assert!((chat.settings.temperature - 1.5).abs() < f32::EPSILON);

    run(&h, private(alice(), 3, "/temperature")).await;
    assert_eq!(last_text(&h), "Current temperature: 1.5");
}

#[tokio::test]
async fn test_model_and_system_prompt_are_per_chat() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new().on_any().respond_text("Arr!");
    let h = TestHarness::new(config_in(&dir), backend);

    run(&h, private(alice(), 1, "/model gpt-4o")).await;
    run(&h, private(alice(), 2, "/system You are a pirate.")).await;

    let chat = h.store.get(ChatId(7)).unwrap().unwrap();
    assert_eq!(chat.settings.model, "gpt-4o");
    assert_eq!(chat.settings.system_prompt, "You are a pirate.");

    chatrelay_core::conversation::handle_message(&h.ctx, &private(alice(), 3, "hello"))
        .await
        .unwrap();
    let call = h.backend.calls().pop().unwrap();
    assert_eq!(call.model, "gpt-4o");
    assert_eq!(call.messages[0].role, Role::System);
    assert_eq!(call.messages[0].content, "You are a pirate.");

    // Another chat keeps the defaults
    assert!(h.store.get(ChatId(8)).unwrap().is_none());

    run(&h, private(alice(), 4, "/system clear")).await;
    let chat = h.store.get(ChatId(7)).unwrap().unwrap();
    assert!(chat.settings.system_prompt.is_empty());
}

#[tokio::test]
async fn test_markdown_toggle() {
    let dir = TempDir::new().unwrap();
    let h = TestHarness::new(config_in(&dir), MockBackend::new());

    run(&h, private(alice(), 1, "/markdown on")).await;
    assert!(h.store.get(ChatId(7)).unwrap().unwrap().settings.use_markdown);
    assert_eq!(last_text(&h), "Markdown replies enabled.");

    run(&h, private(alice(), 2, "/markdown maybe")).await;
    assert_eq!(last_text(&h), "Usage: /markdown on|off");
    assert!(h.store.get(ChatId(7)).unwrap().unwrap().settings.use_markdown);
}

#[tokio::test]
async fn test_history_lists_conversation() {
    let dir = TempDir::new().unwrap();
    let h = TestHarness::new(config_in(&dir), MockBackend::new());
    seed_history(&h, ChatId(7), 1);

    run(&h, private(alice(), 1, "/history")).await;

    assert_eq!(last_text(&h), "1. User: q0\n2. Assistant: a0");
}

#[tokio::test]
async fn test_translate_uses_reply_text_and_leaves_history_alone() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new().on_prompt("bonjour").respond_text("hello");
    let h = TestHarness::new(config_in(&dir), backend);

    let msg = private(alice(), 2, "/translate").with_reply_to(ReplyTo {
        message_id: 1,
        sender_id: Some(8),
        text: Some("bonjour".to_string()),
    });
    run(&h, msg).await;

    assert_eq!(last_text(&h), "hello");
    let call = h.backend.calls().pop().unwrap();
    assert_eq!(call.messages.len(), 2);
    assert_eq!(call.messages[0].role, Role::System);
    assert!((call.temperature - 0.6).abs() < f32::EPSILON);
    assert_eq!(h.store.upsert_count(), 0);
}

#[tokio::test]
async fn test_rewrite_without_text_shows_usage() {
    let dir = TempDir::new().unwrap();
    let h = TestHarness::new(config_in(&dir), MockBackend::new());

    run(&h, private(alice(), 1, "/grammar")).await;

    assert_eq!(
        last_text(&h),
        "Usage: /grammar <text>, or reply to a message with /grammar"
    );
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn test_summarize_reads_transcript() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new().on_any().respond_text("They said hi.");
    let h = TestHarness::new(config_in(&dir), backend);

    run(&h, group(alice(), 1, "/summarize")).await;
    assert_eq!(last_text(&h), "Nothing to summarize yet.");

    h.ctx.transcripts.append(&group(alice(), 2, "hi")).await.unwrap();
    h.ctx.transcripts.append(&group(bob(), 3, "hello there")).await.unwrap();
    run(&h, group(alice(), 4, "/summarize")).await;

    assert_eq!(last_text(&h), "They said hi.");
    let call = h.backend.calls().pop().unwrap();
    assert_eq!(call.last_user_text(), Some("Alice: hi\nBob Stone: hello there"));
}

#[tokio::test]
async fn test_imagine_sends_image_and_enforces_cooldown() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.access.admin_id = Some(ADMIN_ID);
    let backend = MockBackend::new()
        .with_image_url("https://img.test/fox.png")
        .on_prompt("a red fox").respond_text("A fox in the snow.");
    let h = TestHarness::new(config, backend);

    run(&h, private(alice(), 1, "/imagine a red fox")).await;

    assert_eq!(h.backend.image_prompts(), vec!["a red fox".to_string()]);
    assert_eq!(
        h.platform.sent_to(ChatId(7)),
        vec![Sent::Image {
            chat_id: ChatId(7),
            url: "https://img.test/fox.png".to_string(),
            caption: "A fox in the snow.".to_string(),
        }]
    );
    let notices = h.platform.sent_to(ChatId(ADMIN_ID));
    assert_eq!(notices.len(), 1);
    assert!(notices[0].text().starts_with("[Image by Alice (alice, ID: 7)] a red fox"));

    run(&h, private(alice(), 2, "/imagine another fox")).await;
    assert!(last_text(&h).starts_with("Please wait"));
    assert_eq!(h.backend.image_prompts().len(), 1);
}

#[tokio::test]
async fn test_admin_skips_image_cooldown() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.access.admin_id = Some(ADMIN_ID);
    let backend = MockBackend::new().with_fallback(MockReply::Empty);
    let h = TestHarness::new(config, backend);

    run(&h, private(admin(), 1, "/imagine one")).await;
    run(&h, private(admin(), 2, "/imagine two")).await;

    assert_eq!(h.backend.image_prompts().len(), 2);
    // Caption falls back to the prompt; no notice to the admin's own chat
    let sent = h.platform.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].text(), "one");
    assert_eq!(sent[1].text(), "two");
}

#[tokio::test]
async fn test_failed_image_generation_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new().with_image_error("content policy");
    let h = TestHarness::new(config_in(&dir), backend);

    run(&h, private(alice(), 1, "/imagine a castle")).await;

    assert!(h.platform.sent().is_empty());
    let chat = h.store.get(ChatId(7)).unwrap().unwrap();
    assert!(!chat.image_generation_allowed(chrono::Utc::now()));
}

#[tokio::test]
async fn test_unknown_command_is_ignored() {
    let dir = TempDir::new().unwrap();
    let h = TestHarness::new(config_in(&dir), MockBackend::new());

    run(&h, private(alice(), 1, "/frobnicate now")).await;

    assert!(h.platform.sent().is_empty());
    assert_eq!(h.store.upsert_count(), 0);
}
