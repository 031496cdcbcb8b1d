// ABOUTME: Main entry point for the chatrelay Telegram bot.
// ABOUTME: Parses CLI flags, loads config, initializes logging and metrics, then runs the relay.

use anyhow::Result;
use chatrelay::platform::TelegramPlatform;
use chatrelay::{app, logging};
use chatrelay_core::{BotContext, CommandKind, Config, MessagingPlatform, SqliteChatStore};
use chatrelay_llm::BackendRegistry;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "chatrelay", version, about = "Telegram bot relaying chats to an LLM")]
struct Cli {
    /// Path to config.toml (skips the default search locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit console logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the bot (default)
    Run,
    /// Load and validate the configuration, then print it with secrets redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config = Config::load_from(cli.config.as_deref())?;

    if let Some(Commands::CheckConfig) = cli.command {
        println!("{:#?}", config);
        return Ok(());
    }

    let _log_guard = logging::init(&config.storage.log_dir(), cli.json_logs)?;
    logging::install_panic_hook();

    tracing::info!(
        provider = %config.completion.provider,
        model = %config.chat.model,
        workers = config.pipeline.workers,
        queue_capacity = config.pipeline.queue_capacity,
        authorized_users = config.access.authorized_users.len(),
        admin = config.access.admin_id.is_some(),
        data_dir = %config.storage.data_dir,
        "Configuration loaded"
    );

    if let Some(port) = config.metrics.prometheus_port {
        chatrelay_core::metrics::init_metrics(port)?;
    }

    let store = Arc::new(SqliteChatStore::open(config.storage.database_path())?);
    let registry = BackendRegistry::default();
    let completion = registry.create_from_config(&config.completion)?;
    tracing::info!(backend = completion.name(), "Completion backend ready");

    let platform = Arc::new(TelegramPlatform::new(&config.telegram).await?);
    if let Err(e) = platform.register_commands(&CommandKind::menu()).await {
        tracing::warn!(error = %e, "Failed to register command menu");
    }

    let ctx = Arc::new(BotContext::new(config, platform, completion, store));

    app::run(ctx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await
}
