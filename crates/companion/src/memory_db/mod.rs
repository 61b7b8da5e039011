//! Memory database module - SQLite-based storage for jobs, chat logs, memories and users
pub mod schema;
pub mod job_store;
pub mod chat_log_store;
pub mod memory_store;
pub mod user_store;

pub use schema::*;
pub use job_store::{JobStore, PollOutcome};
pub use chat_log_store::ChatLogStore;
pub use memory_store::MemoryStore;
pub use user_store::UserStore;

use std::path::Path;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// A summarization window ready to be persisted as a memory row.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub user_id: i64,
    pub first_chat_log_id: i64,
    pub last_chat_log_id: i64,
    pub content: String,
    pub keywords: Vec<String>,
    pub last_entry_at: DateTime<Utc>,
}

pub struct MemoryDatabase {
    pub jobs: JobStore,
    pub chat_log: ChatLogStore,
    pub memories: MemoryStore,
    pub users: UserStore,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryDatabase {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening memory database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
            conn.execute_batch(schema::SCHEMA_SQL)?;
        }
        info!("Memory database initialized successfully");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// In-memory database for tests. One pooled connection only: every handle
    /// to `:memory:` would otherwise see its own private database.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let conn = pool.get()?;
            conn.execute_batch(schema::SCHEMA_SQL)?;
        }
        Ok(Self::from_pool(Arc::new(pool)))
    }

    fn from_pool(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self {
            jobs: JobStore::new(Arc::clone(&pool)),
            chat_log: ChatLogStore::new(Arc::clone(&pool)),
            memories: MemoryStore::new(Arc::clone(&pool)),
            users: UserStore::new(Arc::clone(&pool)),
            pool,
        }
    }

    /// Direct pool access for callers that need raw SQL (tests, admin tooling).
    pub fn raw_pool(&self) -> &Arc<Pool<SqliteConnectionManager>> {
        &self.pool
    }

    /// Persist one completed summarization window: insert the memory row and
    /// flip `summarized` for the covered non-system chat rows in a single
    /// transaction, so an interruption leaves the window fully retryable.
    pub fn persist_window(&self, memory: &NewMemory) -> anyhow::Result<i64> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO memories
             (user_id, first_chat_log_id, last_chat_log_id, content, keywords, last_entry_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                memory.user_id,
                memory.first_chat_log_id,
                memory.last_chat_log_id,
                &memory.content,
                serde_json::to_string(&memory.keywords)?,
                format_timestamp(memory.last_entry_at),
                format_timestamp(Utc::now()),
            ],
        )?;
        let memory_id = tx.last_insert_rowid();

        // System rows inside the range keep summarized = FALSE: they are never
        // part of a memory and never displayed, only skipped.
        tx.execute(
            "UPDATE chat_log SET summarized = TRUE
             WHERE user_id = ?1 AND id BETWEEN ?2 AND ?3
               AND summarized = FALSE AND role != 'system'",
            params![memory.user_id, memory.first_chat_log_id, memory.last_chat_log_id],
        )?;

        tx.commit()?;
        debug!(
            "Persisted memory {} for user {} covering chat rows {}..={}",
            memory_id, memory.user_id, memory.first_chat_log_id, memory.last_chat_log_id
        );
        Ok(memory_id)
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}
