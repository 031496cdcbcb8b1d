// ABOUTME: Bounded work queue and fixed-size worker pool draining it.
// ABOUTME: A full queue blocks the producer; a failing or panicking update never stops a worker.

use crate::context::BotContext;
use crate::conversation;
use crate::handlers;
use crate::metrics;
use crate::traits::IncomingMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Work executed by the pool for each queued message
#[async_trait]
pub trait UpdateProcessor: Send + Sync + 'static {
    /// Handle one message end to end
    async fn process(&self, msg: IncomingMessage) -> Result<()>;

    /// Called after every processed message, including failed ones
    async fn checkpoint(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UpdateProcessor for BotContext {
    async fn process(&self, msg: IncomingMessage) -> Result<()> {
        match &msg.command {
            Some(cmd) => handlers::handle_command(self, &msg, cmd).await,
            None => conversation::handle_message(self, &msg).await.map(|_| ()),
        }
    }

    async fn checkpoint(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.flush())
            .await
            .context("Store flush task failed")?
    }
}

/// Producer side of the bounded queue
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<IncomingMessage>,
}

/// Consumer side, shared by all workers
pub struct WorkReceiver {
    rx: mpsc::Receiver<IncomingMessage>,
}

/// Create a queue holding at most `capacity` messages
pub fn work_queue(capacity: usize) -> (WorkQueue, WorkReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (WorkQueue { tx }, WorkReceiver { rx })
}

impl WorkReceiver {
    /// Take the next message directly, bypassing the pool
    pub async fn recv(&mut self) -> Option<IncomingMessage> {
        self.rx.recv().await
    }
}

impl WorkQueue {
    /// Enqueue, waiting while the queue is full. Fails only once every worker is gone.
    pub async fn enqueue(&self, msg: IncomingMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| anyhow::anyhow!("Work queue closed"))?;
        metrics::set_queue_depth(self.depth());
        Ok(())
    }

    /// Messages waiting to be picked up
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks draining `receiver` with `processor`
    pub fn spawn<P: UpdateProcessor>(workers: usize, receiver: WorkReceiver, processor: Arc<P>) -> Self {
        let rx = Arc::new(Mutex::new(receiver.rx));
        let handles = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let processor = Arc::clone(&processor);
                tokio::spawn(worker_loop(id, rx, processor))
            })
            .collect::<Vec<_>>();
        tracing::info!(workers = handles.len(), "Worker pool started");
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit. Workers exit once all `WorkQueue`
    /// handles are dropped and the queue is drained.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop<P: UpdateProcessor>(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<IncomingMessage>>>,
    processor: Arc<P>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(msg) = next else {
            break;
        };
        let chat_id = msg.chat_id;

        match AssertUnwindSafe(processor.process(msg)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(worker = id, chat_id = %chat_id, error = %e, "Update processing failed");
                metrics::record_error("update_processing");
            }
            Err(panic) => {
                tracing::error!(
                    worker = id,
                    chat_id = %chat_id,
                    panic = panic_message(panic.as_ref()),
                    "Update processing panicked, worker continues"
                );
                metrics::record_error("update_panic");
            }
        }

        if let Err(e) = processor.checkpoint().await {
            tracing::warn!(worker = id, error = %e, "Checkpoint after update failed");
            metrics::record_error("store_flush");
        }
    }
    tracing::debug!(worker = id, "Worker exiting, queue closed");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
