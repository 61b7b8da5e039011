//! Append-only chat log storage and the unsummarized-tail scans the segmenter runs on
use crate::memory_db::schema::*;
use rusqlite::{params, Row};
use chrono::{DateTime, Utc};
use tracing::debug;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_SYSTEM: &str = "system";

pub fn is_known_role(role: &str) -> bool {
    matches!(role, ROLE_USER | ROLE_ASSISTANT | ROLE_SYSTEM)
}

pub struct ChatLogStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl ChatLogStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Append one row. Rows are never updated afterwards except for the
    /// summarized flag, which only the summarization loop flips.
    pub fn append(
        &self,
        user_id: i64,
        persona: &str,
        role: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        if !is_known_role(role) {
            return Err(anyhow::anyhow!("Unknown chat role: {}", role));
        }
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO chat_log (user_id, persona, role, content, timestamp, summarized)
             VALUES (?1, ?2, ?3, ?4, ?5, FALSE)",
            params![user_id, persona, role, content, format_timestamp(timestamp)],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Appended chat_log row {} for user {}", id, user_id);
        Ok(id)
    }

    /// Full ordered history for a user, raw, including system rows.
    pub fn entries_for_user(&self, user_id: i64) -> anyhow::Result<Vec<ChatLogEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, persona, role, content, timestamp, summarized
             FROM chat_log WHERE user_id = ?1 ORDER BY timestamp, id",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(Self::row_to_entry(row)?);
        }
        Ok(entries)
    }

    /// Unsummarized rows with `id > after_id`, in id order, system rows included.
    /// The segmenter reads this fresh on every call so already-consumed rows
    /// can never enter a second window.
    pub fn unsummarized_tail(&self, user_id: i64, after_id: i64) -> anyhow::Result<Vec<ChatLogEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, persona, role, content, timestamp, summarized
             FROM chat_log
             WHERE user_id = ?1 AND summarized = FALSE AND id > ?2
             ORDER BY id",
        )?;
        let mut rows = stmt.query(params![user_id, after_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(Self::row_to_entry(row)?);
        }
        Ok(entries)
    }

    /// Unsummarized non-system rows strictly after a cutoff timestamp, or the
    /// whole unsummarized non-system tail when no cutoff is given. This is the
    /// tail the discussion reconstructor appends after the rendered memories.
    pub fn unsummarized_display_tail(
        &self,
        user_id: i64,
        after: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<ChatLogEntry>> {
        let conn = self.get_conn()?;
        let cutoff = after.map(format_timestamp).unwrap_or_default();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, persona, role, content, timestamp, summarized
             FROM chat_log
             WHERE user_id = ?1 AND summarized = FALSE AND role != 'system' AND timestamp > ?2
             ORDER BY timestamp, id",
        )?;
        let mut rows = stmt.query(params![user_id, cutoff])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(Self::row_to_entry(row)?);
        }
        Ok(entries)
    }

    fn row_to_entry(row: &Row) -> anyhow::Result<ChatLogEntry> {
        let timestamp: String = row.get(5)?;
        Ok(ChatLogEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            persona: row.get(2)?,
            role: row.get(3)?,
            content: row.get(4)?,
            timestamp: parse_timestamp(&timestamp)?,
            summarized: row.get(6)?,
        })
    }
}
