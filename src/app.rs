// ABOUTME: Wires the dispatcher, work queue and worker pool around a BotContext and runs them.
// ABOUTME: On shutdown the queue is closed, workers drain it, and the chat store is flushed.

use anyhow::{Context, Result};
use chatrelay_core::{work_queue, BotContext, Dispatcher, WorkerPool};
use std::future::Future;
use std::sync::Arc;

/// Run the relay until the platform's update stream ends or `shutdown` resolves
pub async fn run(ctx: Arc<BotContext>, shutdown: impl Future<Output = ()>) -> Result<()> {
    let pipeline = &ctx.config.pipeline;
    let (queue, receiver) = work_queue(pipeline.queue_capacity);
    let pool = WorkerPool::spawn(pipeline.workers, receiver, Arc::clone(&ctx));

    let updates = ctx.platform.update_stream().await?;
    let dispatcher = Dispatcher::new(Arc::clone(&ctx), queue);

    tracing::info!(
        platform = ctx.platform.platform_id(),
        bot = ctx.platform.bot_username(),
        workers = pool.size(),
        queue_capacity = pipeline.queue_capacity,
        "Relay running"
    );

    // Dropping the dispatcher in either branch closes the queue
    let result = tokio::select! {
        result = dispatcher.run(updates) => result,
        () = shutdown => {
            tracing::info!("Shutdown signal received, draining work queue");
            Ok(())
        }
    };

    pool.join().await;

    let store = Arc::clone(&ctx.store);
    tokio::task::spawn_blocking(move || store.flush())
        .await
        .context("Final store flush task failed")?
        .context("Final store flush failed")?;

    if let Err(e) = ctx.platform.shutdown().await {
        tracing::warn!(error = %e, "Platform shutdown failed");
    }

    tracing::info!("Shutdown complete");
    result
}
