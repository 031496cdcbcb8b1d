// ABOUTME: Tests for the scripted MockBackend used throughout the pipeline tests.
// ABOUTME: Covers pattern matching, empty and error replies, call recording and gating.

use chatrelay_llm::backends::mock::{MockBackend, MockReply};
use chatrelay_llm::{CompletionBackend, ImageSize, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn user(text: &str) -> Vec<Message> {
    vec![Message::system("sys"), Message::user(text)]
}

#[tokio::test]
async fn test_mock_backend_returns_configured_text_response() {
    let mock = MockBackend::new().on_prompt("hello").respond_text("Hi there!");

    let completion = mock.complete(&user("hello"), "m", 0.8).await.unwrap();
    assert_eq!(completion.first_text(), Some("Hi there!"));
}

#[tokio::test]
async fn test_mock_backend_empty_response_has_no_choices() {
    let mock = MockBackend::new().on_any().respond_empty();

    let completion = mock.complete(&user("anything"), "m", 0.8).await.unwrap();
    assert!(completion.choices.is_empty());
}

#[tokio::test]
async fn test_mock_backend_error_response() {
    let mock = MockBackend::new().on_prompt("fail").respond_error("connection reset");

    let err = mock.complete(&user("fail"), "m", 0.8).await.unwrap_err();
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn test_mock_backend_out_of_order_match() {
    let mock = MockBackend::new()
        .on_prompt("first")
        .respond_text("one")
        .on_prompt("second")
        .respond_text("two");

    let second = mock.complete(&user("second"), "m", 0.8).await.unwrap();
    assert_eq!(second.first_text(), Some("two"));
    assert_eq!(mock.pending_expectations(), 1);

    let first = mock.complete(&user("first"), "m", 0.8).await.unwrap();
    assert_eq!(first.first_text(), Some("one"));
}

#[tokio::test]
async fn test_mock_backend_default_without_expectation() {
    let mock = MockBackend::new();
    let completion = mock.complete(&user("unscripted"), "m", 0.8).await.unwrap();
    assert_eq!(
        completion.first_text(),
        Some("Mock: no expectation for 'unscripted'")
    );
}

#[tokio::test]
async fn test_mock_backend_fallback_applies_after_script() {
    let mock = MockBackend::new()
        .on_any()
        .respond_text("scripted")
        .with_fallback(MockReply::Empty);

    let first = mock.complete(&user("a"), "m", 0.8).await.unwrap();
    assert_eq!(first.first_text(), Some("scripted"));
    for _ in 0..3 {
        let next = mock.complete(&user("b"), "m", 0.8).await.unwrap();
        assert!(next.choices.is_empty());
    }
}

#[tokio::test]
async fn test_mock_backend_records_calls() {
    let mock = MockBackend::new();
    let handle = mock.clone();

    mock.complete(&user("hello"), "gpt-4", 0.3).await.unwrap();

    let calls = handle.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].model, "gpt-4");
    assert_eq!(calls[0].temperature, 0.3);
    assert_eq!(calls[0].messages.len(), 2);
    assert_eq!(calls[0].last_user_text(), Some("hello"));
}

#[tokio::test]
async fn test_mock_backend_gate_holds_call_until_permit() {
    let gate = Arc::new(Semaphore::new(0));
    let mock = MockBackend::new().with_gate(gate.clone());
    let backend: Arc<dyn CompletionBackend> = Arc::new(mock.clone());

    let task = tokio::spawn(async move {
        let messages = user("held");
        backend.complete(&messages, "m", 0.8).await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mock.call_count(), 1, "call should be recorded while held");
    assert!(!task.is_finished());

    gate.add_permits(1);
    let completion = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("call should finish once released")
        .unwrap()
        .unwrap();
    assert!(completion.first_text().is_some());
}

#[tokio::test]
async fn test_mock_backend_image_generation() {
    let mock = MockBackend::new().with_image_url("https://img.example/cat.png");
    let url = mock.generate_image("a cat", ImageSize::Large).await.unwrap();
    assert_eq!(url, "https://img.example/cat.png");
    assert_eq!(mock.image_prompts(), vec!["a cat".to_string()]);

    let failing = MockBackend::new().with_image_error("quota exceeded");
    assert!(failing.generate_image("a dog", ImageSize::Small).await.is_err());
}
