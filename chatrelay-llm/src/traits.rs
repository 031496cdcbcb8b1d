// ABOUTME: Core CompletionBackend trait that all completion providers implement.
// ABOUTME: Separates transport failures (Err) from empty answers (Ok with no choices).

use crate::message::{Completion, ImageSize, Message};
use anyhow::Result;
use futures::future::BoxFuture;

/// Core trait that all completion backends implement.
///
/// Methods return boxed futures so backends can be held as
/// `Arc<dyn CompletionBackend>` and shared across worker tasks.
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    /// Request a chat completion for the ordered message list.
    ///
    /// Returns `Err` when the provider could not be reached or rejected the
    /// request. A provider answer with no usable choice is `Ok` with an
    /// empty `choices` list.
    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
        model: &'a str,
        temperature: f32,
    ) -> BoxFuture<'a, Result<Completion>>;

    /// Generate an image for the prompt and return its URL
    fn generate_image<'a>(&'a self, prompt: &'a str, size: ImageSize)
        -> BoxFuture<'a, Result<String>>;
}
