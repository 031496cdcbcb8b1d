// ABOUTME: Chat Store contract plus in-memory and SQLite-backed implementations.
// ABOUTME: Reads and writes go to a cache; flush persists dirty chats in one transaction.

use crate::chat::{Chat, ChatId, ChatSettings, ConversationEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Keyed storage of Chat records.
///
/// Implementations are shared across workers; callers that read-modify-write
/// a chat are expected to hold that chat's lock from [`crate::locks::ChatLocks`].
pub trait ChatStore: Send + Sync {
    /// Current record for `chat_id`, if one exists
    fn get(&self, chat_id: ChatId) -> Result<Option<Chat>>;

    /// Insert or replace the record for `chat.chat_id`
    fn upsert(&self, chat: &Chat) -> Result<()>;

    /// Insert `chat` only if no record exists; returns the surviving record
    fn get_or_insert(&self, chat: Chat) -> Result<Chat>;

    /// Persist any buffered changes
    fn flush(&self) -> Result<()>;
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|e| anyhow::anyhow!("{} mutex poisoned: {}", what, e))
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store; nothing survives a restart
#[derive(Default)]
pub struct MemoryChatStore {
    chats: Mutex<HashMap<ChatId, Chat>>,
    upserts: AtomicUsize,
    flushes: AtomicUsize,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `upsert` calls
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of `flush` calls
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.chats.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChatStore for MemoryChatStore {
    fn get(&self, chat_id: ChatId) -> Result<Option<Chat>> {
        Ok(lock(&self.chats, "Chat store")?.get(&chat_id).cloned())
    }

    fn upsert(&self, chat: &Chat) -> Result<()> {
        lock(&self.chats, "Chat store")?.insert(chat.chat_id, chat.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_or_insert(&self, chat: Chat) -> Result<Chat> {
        let mut chats = lock(&self.chats, "Chat store")?;
        Ok(chats.entry(chat.chat_id).or_insert(chat).clone())
    }

    fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// SQLite store
// =============================================================================

#[derive(Default)]
struct CacheState {
    chats: HashMap<ChatId, Chat>,
    dirty: HashSet<ChatId>,
}

/// SQLite-backed store with a write-back cache.
///
/// All chats are loaded at open. `get`/`upsert` touch only the cache;
/// `flush` writes every dirty chat in a single transaction. Chats whose
/// write failed stay dirty and are retried by the next flush.
#[derive(Clone)]
pub struct SqliteChatStore {
    db: Arc<Mutex<Connection>>,
    cache: Arc<Mutex<CacheState>>,
    path: PathBuf,
}

impl SqliteChatStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chats (
                chat_id INTEGER PRIMARY KEY,
                settings TEXT NOT NULL,
                history TEXT NOT NULL,
                next_image_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        let chats = load_all(&conn)?;
        tracing::info!(
            db = %path.display(),
            chats = chats.len(),
            "SqliteChatStore initialized"
        );

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            cache: Arc::new(Mutex::new(CacheState {
                chats,
                dirty: HashSet::new(),
            })),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of chats changed since the last successful flush
    pub fn dirty_count(&self) -> usize {
        self.cache.lock().map(|c| c.dirty.len()).unwrap_or(0)
    }

    fn write_batch(db: &mut Connection, batch: &[Chat]) -> Result<()> {
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO chats (chat_id, settings, history, next_image_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chat_id) DO UPDATE SET
                    settings = excluded.settings,
                    history = excluded.history,
                    next_image_at = excluded.next_image_at,
                    updated_at = excluded.updated_at",
            )?;
            let now = Utc::now().to_rfc3339();
            for chat in batch {
                stmt.execute(params![
                    chat.chat_id.0,
                    serde_json::to_string(&chat.settings)?,
                    serde_json::to_string(&chat.history)?,
                    chat.next_image_gen_allowed_at.to_rfc3339(),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn load_all(conn: &Connection) -> Result<HashMap<ChatId, Chat>> {
    let mut stmt =
        conn.prepare("SELECT chat_id, settings, history, next_image_at FROM chats")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut chats = HashMap::new();
    for row in rows {
        let (id, settings, history, next_image_at) = row?;
        let chat_id = ChatId(id);
        let settings: ChatSettings = serde_json::from_str(&settings)
            .with_context(|| format!("Corrupt settings for chat {}", chat_id))?;
        let history: Vec<ConversationEntry> = serde_json::from_str(&history)
            .with_context(|| format!("Corrupt history for chat {}", chat_id))?;
        let next_image_gen_allowed_at = DateTime::parse_from_rfc3339(&next_image_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        chats.insert(
            chat_id,
            Chat {
                chat_id,
                settings,
                history,
                next_image_gen_allowed_at,
            },
        );
    }
    Ok(chats)
}

impl ChatStore for SqliteChatStore {
    fn get(&self, chat_id: ChatId) -> Result<Option<Chat>> {
        Ok(lock(&self.cache, "Chat cache")?.chats.get(&chat_id).cloned())
    }

    fn upsert(&self, chat: &Chat) -> Result<()> {
        let mut cache = lock(&self.cache, "Chat cache")?;
        cache.chats.insert(chat.chat_id, chat.clone());
        cache.dirty.insert(chat.chat_id);
        Ok(())
    }

    fn get_or_insert(&self, chat: Chat) -> Result<Chat> {
        let mut cache = lock(&self.cache, "Chat cache")?;
        let CacheState { chats, dirty } = &mut *cache;
        let chat_id = chat.chat_id;
        let mut inserted = false;
        let record = chats
            .entry(chat_id)
            .or_insert_with(|| {
                inserted = true;
                chat
            })
            .clone();
        if inserted {
            dirty.insert(chat_id);
        }
        Ok(record)
    }

    fn flush(&self) -> Result<()> {
        // Held from drain to commit so concurrent flushes commit in drain order
        let mut db = lock(&self.db, "Database")?;
        let batch: Vec<Chat> = {
            let mut cache = lock(&self.cache, "Chat cache")?;
            let CacheState { chats, dirty } = &mut *cache;
            dirty
                .drain()
                .filter_map(|id| chats.get(&id).cloned())
                .collect()
        };
        if batch.is_empty() {
            return Ok(());
        }

        if let Err(e) = Self::write_batch(&mut db, &batch) {
            // Put the ids back so a later flush retries them
            if let Ok(mut cache) = self.cache.lock() {
                cache.dirty.extend(batch.iter().map(|c| c.chat_id));
            }
            return Err(e).context("Failed to flush chats to SQLite");
        }

        tracing::debug!(count = batch.len(), "Flushed chats");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChatSettings {
        ChatSettings {
            temperature: 0.8,
            model: "gpt-3.5-turbo".to_string(),
            max_history: 5,
            use_markdown: false,
            system_prompt: String::new(),
        }
    }

    #[test]
    fn test_memory_get_or_insert_keeps_first_record() {
        let store = MemoryChatStore::new();
        let mut first = Chat::new(ChatId(1), settings());
        first.settings.model = "first".to_string();
        let mut second = Chat::new(ChatId(1), settings());
        second.settings.model = "second".to_string();

        assert_eq!(store.get_or_insert(first).unwrap().settings.model, "first");
        assert_eq!(store.get_or_insert(second).unwrap().settings.model, "first");
        assert_eq!(store.len(), 1);
        assert_eq!(store.upsert_count(), 0);
    }

    #[test]
    fn test_sqlite_upsert_is_cached_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.db");
        let store = SqliteChatStore::open(&path).unwrap();

        store.upsert(&Chat::new(ChatId(9), settings())).unwrap();
        assert!(store.get(ChatId(9)).unwrap().is_some());
        assert_eq!(store.dirty_count(), 1);

        let reopened = SqliteChatStore::open(&path).unwrap();
        assert!(reopened.get(ChatId(9)).unwrap().is_none());

        store.flush().unwrap();
        assert_eq!(store.dirty_count(), 0);
        let reopened = SqliteChatStore::open(&path).unwrap();
        assert!(reopened.get(ChatId(9)).unwrap().is_some());
    }

    #[test]
    fn test_sqlite_get_or_insert_marks_dirty_only_when_new() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteChatStore::open(dir.path().join("chats.db")).unwrap();

        store.get_or_insert(Chat::new(ChatId(3), settings())).unwrap();
        assert_eq!(store.dirty_count(), 1);
        store.flush().unwrap();

        store.get_or_insert(Chat::new(ChatId(3), settings())).unwrap();
        assert_eq!(store.dirty_count(), 0);
    }

    #[test]
    fn test_overlapping_flushes_persist_latest_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.db");
        let store = SqliteChatStore::open(&path).unwrap();

        let mut chat = Chat::new(ChatId(5), settings());
        chat.settings.model = "v1".to_string();
        store.upsert(&chat).unwrap();

        // Hold the connection so both flushes queue up behind it
        let db_guard = store.db.lock().unwrap();
        let first = {
            let store = store.clone();
            std::thread::spawn(move || store.flush())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));

        chat.settings.model = "v2".to_string();
        store.upsert(&chat).unwrap();
        let second = {
            let store = store.clone();
            std::thread::spawn(move || store.flush())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(db_guard);

        first.join().unwrap().unwrap();
        second.join().unwrap().unwrap();

        assert_eq!(store.dirty_count(), 0);
        let reopened = SqliteChatStore::open(&path).unwrap();
        assert_eq!(reopened.get(ChatId(5)).unwrap().unwrap().settings.model, "v2");
    }

    #[test]
    fn test_flush_with_nothing_dirty_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteChatStore::open(dir.path().join("nested/dir/chats.db")).unwrap();
        store.flush().unwrap();
        assert!(store.path().exists());
    }
}
