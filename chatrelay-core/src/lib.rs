// ABOUTME: Platform-agnostic relay pipeline between a chat platform and a completion provider.
// ABOUTME: Dispatcher, worker pool, chat store, conversation assembly and command handling.

pub mod assembler;
pub mod chat;
pub mod commands;
pub mod config;
pub mod context;
pub mod conversation;
pub mod dispatcher;
pub mod handlers;
pub mod locks;
pub mod metrics;
pub mod pool;
pub mod store;
pub mod testing;
pub mod traits;
pub mod transcript;
pub mod utils;

pub use chat::{Chat, ChatId, ChatSettings, ConversationEntry};
pub use commands::{Command, CommandKind, ParseResult};
pub use config::Config;
pub use context::BotContext;
pub use conversation::{CompletionReply, TurnOutcome};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use pool::{work_queue, UpdateProcessor, WorkQueue, WorkerPool};
pub use store::{ChatStore, MemoryChatStore, SqliteChatStore};
pub use traits::{IncomingMessage, MessagingPlatform, ReplyTo, Sender, Update, UpdateStream};

// Re-export completion types
pub use chatrelay_llm::{BackendRegistry, CompletionBackend, Message, Role};
