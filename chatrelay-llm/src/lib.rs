// ABOUTME: Pluggable completion backend abstraction for chatrelay.
// ABOUTME: Provides the CompletionBackend trait, chat message types and OpenAI/mock backends.

pub mod backends;
pub mod config;
pub mod message;
pub mod registry;
pub mod traits;

pub use message::{Choice, Completion, ImageSize, Message, Role};
pub use config::BackendConfig;
pub use registry::{BackendFactory, BackendRegistry};
pub use traits::CompletionBackend;
