// ABOUTME: Registry of per-chat async mutexes that serialize work on the same chat.
// ABOUTME: Different chats proceed in parallel; a guard is held across the whole turn.

use crate::chat::ChatId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry size above which idle entries are pruned on the next lock
const PRUNE_THRESHOLD: usize = 1024;

/// Guard for one chat; dropping it lets the next waiter in
pub type ChatGuard = OwnedMutexGuard<()>;

#[derive(Clone, Default)]
pub struct ChatLocks {
    inner: Arc<Mutex<HashMap<ChatId, Arc<AsyncMutex<()>>>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `chat_id`
    pub async fn lock(&self, chat_id: ChatId) -> ChatGuard {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if map.len() > PRUNE_THRESHOLD {
                prune_idle(&mut map);
            }
            Arc::clone(map.entry(chat_id).or_default())
        };
        mutex.lock_owned().await
    }

    /// Number of chats with a registered lock
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries nobody holds or waits on
    pub fn prune(&self) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        prune_idle(&mut map);
    }
}

// An entry is idle when the map holds the only reference: guards and waiters
// each keep their own clone of the Arc.
fn prune_idle(map: &mut HashMap<ChatId, Arc<AsyncMutex<()>>>) {
    let before = map.len();
    map.retain(|_, m| Arc::strong_count(m) > 1);
    tracing::debug!(pruned = before - map.len(), "Pruned idle chat locks");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_chat_is_exclusive() {
        let locks = ChatLocks::new();
        let guard = locks.lock(ChatId(1)).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(ChatId(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second lock must wait");

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_chats_do_not_block() {
        let locks = ChatLocks::new();
        let _a = locks.lock(ChatId(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(ChatId(2))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = ChatLocks::new();
        let held = locks.lock(ChatId(1)).await;
        drop(locks.lock(ChatId(2)).await);
        assert_eq!(locks.len(), 2);

        locks.prune();
        assert_eq!(locks.len(), 1);
        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
