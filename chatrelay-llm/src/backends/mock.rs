// ABOUTME: Mock backend for testing - returns pre-configured completions.
// ABOUTME: Records every call and can answer with text, zero choices, errors, or hold calls open.
//!
//! # Example
//!
//! ```no_run
//! use chatrelay_llm::backends::mock::MockBackend;
//! use chatrelay_llm::{CompletionBackend, Message};
//!
//! # async fn example() {
//! let mock = MockBackend::new()
//!     .on_prompt("hello").respond_text("Hi there!")
//!     .on_any().respond_empty();
//!
//! let messages = vec![Message::user("hello")];
//! let completion = mock.complete(&messages, "gpt-3.5-turbo", 0.8).await.unwrap();
//! assert_eq!(completion.first_text(), Some("Hi there!"));
//! assert_eq!(mock.call_count(), 1);
//! # }
//! ```

use crate::message::{Completion, ImageSize, Message, Role};
use crate::traits::CompletionBackend;
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// What the mock answers with
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Provider answered with zero choices
    Empty,
    /// Transport/protocol failure
    Error(String),
}

/// A completion request as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub model: String,
    pub temperature: f32,
}

impl RecordedCall {
    /// Content of the last user message in the request
    pub fn last_user_text(&self) -> Option<&str> {
        last_user_text(&self.messages)
    }
}

struct Expectation {
    /// Substring matched against the last user message; `None` matches anything
    pattern: Option<String>,
    reply: MockReply,
}

struct MockState {
    expectations: Mutex<VecDeque<Expectation>>,
    fallback: Mutex<Option<MockReply>>,
    calls: Mutex<Vec<RecordedCall>>,
    image_prompts: Mutex<Vec<String>>,
    image_url: Mutex<Result<String, String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

/// Mock backend for testing. Cloning shares state so a test can keep a handle
/// for assertions after handing the backend to the code under test.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    /// Create a new mock backend with no expectations
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                expectations: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                image_prompts: Mutex::new(Vec::new()),
                image_url: Mutex::new(Ok("https://images.invalid/mock.png".to_string())),
                gate: Mutex::new(None),
            }),
        }
    }

    /// Set up an expectation for a request whose last user message contains `pattern`
    pub fn on_prompt(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: Some(pattern.to_string()),
        }
    }

    /// Set up an expectation that matches the next request regardless of content
    pub fn on_any(self) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: None,
        }
    }

    /// Reply used whenever no expectation matches
    pub fn with_fallback(self, reply: MockReply) -> Self {
        *lock(&self.state.fallback) = Some(reply);
        self
    }

    /// Make every call wait for a permit from `gate` before answering.
    /// Permits are consumed, so each `add_permits(1)` releases one call.
    pub fn with_gate(self, gate: Arc<Semaphore>) -> Self {
        *lock(&self.state.gate) = Some(gate);
        self
    }

    /// URL returned by image generation
    pub fn with_image_url(self, url: &str) -> Self {
        *lock(&self.state.image_url) = Ok(url.to_string());
        self
    }

    /// Make image generation fail
    pub fn with_image_error(self, message: &str) -> Self {
        *lock(&self.state.image_url) = Err(message.to_string());
        self
    }

    /// All completion calls received so far, in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.state.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state.calls).len()
    }

    /// Prompts passed to image generation
    pub fn image_prompts(&self) -> Vec<String> {
        lock(&self.state.image_prompts).clone()
    }

    /// Number of expectations not yet consumed
    pub fn pending_expectations(&self) -> usize {
        lock(&self.state.expectations).len()
    }

    /// Factory function for the registry
    pub fn factory() -> crate::registry::BackendFactory {
        Box::new(|_config| {
            let backend: Arc<dyn CompletionBackend> = Arc::new(MockBackend::new());
            Ok(backend)
        })
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        // FIFO preference: take the front if it matches, otherwise the first match in the queue
        let matched = {
            let mut exp = lock(&self.state.expectations);
            let matches = |e: &Expectation| match &e.pattern {
                Some(p) => prompt.contains(p.as_str()),
                None => true,
            };
            match exp.front().map(matches) {
                Some(true) => exp.pop_front(),
                Some(false) => exp.iter().position(matches).and_then(|i| exp.remove(i)),
                None => None,
            }
        };

        if let Some(expectation) = matched {
            return expectation.reply;
        }
        lock(&self.state.fallback)
            .clone()
            .unwrap_or_else(|| MockReply::Text(format!("Mock: no expectation for '{}'", prompt)))
    }

    async fn answer(&self, messages: &[Message], model: &str, temperature: f32) -> Result<Completion> {
        lock(&self.state.calls).push(RecordedCall {
            messages: messages.to_vec(),
            model: model.to_string(),
            temperature,
        });

        let gate = lock(&self.state.gate).clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| anyhow::anyhow!("mock gate closed"))?
                .forget();
        }

        let prompt = last_user_text(messages).unwrap_or_default().to_string();
        match self.next_reply(&prompt) {
            MockReply::Text(text) => Ok(Completion::from_texts([text])),
            MockReply::Empty => Ok(Completion::empty()),
            MockReply::Error(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
        model: &'a str,
        temperature: f32,
    ) -> BoxFuture<'a, Result<Completion>> {
        Box::pin(self.answer(messages, model, temperature))
    }

    fn generate_image<'a>(
        &'a self,
        prompt: &'a str,
        _size: ImageSize,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            lock(&self.state.image_prompts).push(prompt.to_string());
            lock(&self.state.image_url)
                .clone()
                .map_err(|message| anyhow::anyhow!(message))
        })
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: Option<String>,
}

impl ExpectationBuilder {
    /// Respond with the given reply
    pub fn respond_with(self, reply: MockReply) -> MockBackend {
        lock(&self.backend.state.expectations).push_back(Expectation {
            pattern: self.pattern,
            reply,
        });
        self.backend
    }

    /// Respond with a single choice holding `text`
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.respond_with(MockReply::Text(text.to_string()))
    }

    /// Respond with zero choices
    pub fn respond_empty(self) -> MockBackend {
        self.respond_with(MockReply::Empty)
    }

    /// Fail the call as a transport error
    pub fn respond_error(self, message: &str) -> MockBackend {
        self.respond_with(MockReply::Error(message.to_string()))
    }
}

fn last_user_text(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
