//! Memory storage and retrieval operations
use crate::memory_db::schema::*;
use rusqlite::{params, Row};
use tracing::debug;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub struct MemoryStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// The newest `limit` memories for a user, ordered newest-first by the
    /// chat range they cover. The reconstructor reverses this into
    /// chronological order.
    pub fn recent_memories(&self, user_id: i64, limit: usize) -> anyhow::Result<Vec<Memory>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, first_chat_log_id, last_chat_log_id, content, keywords,
                    last_entry_at, created_at
             FROM memories WHERE user_id = ?1
             ORDER BY last_chat_log_id DESC LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![user_id, limit as i64])?;
        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            memories.push(Self::row_to_memory(row)?);
        }
        debug!("Fetched {} recent memories for user {}", memories.len(), user_id);
        Ok(memories)
    }

    /// Every memory for a user in range order. Used by consistency checks.
    pub fn memories_for_user(&self, user_id: i64) -> anyhow::Result<Vec<Memory>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, first_chat_log_id, last_chat_log_id, content, keywords,
                    last_entry_at, created_at
             FROM memories WHERE user_id = ?1 ORDER BY first_chat_log_id",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            memories.push(Self::row_to_memory(row)?);
        }
        Ok(memories)
    }

    /// Highest chat row id covered by any of the user's memories, 0 when none
    /// exist. The summarizer scans the tail from here instead of id 0, so old
    /// system rows (which are never flipped) are not rescanned on every run.
    pub fn latest_covered_id(&self, user_id: i64) -> anyhow::Result<i64> {
        let conn = self.get_conn()?;
        let id = conn.query_row(
            "SELECT COALESCE(MAX(last_chat_log_id), 0) FROM memories WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn row_to_memory(row: &Row) -> anyhow::Result<Memory> {
        let keywords_json: String = row.get(5)?;
        let keywords: Vec<String> = serde_json::from_str(&keywords_json)
            .map_err(|e| anyhow::anyhow!("Failed to parse keywords: {}", e))?;
        let last_entry_at: String = row.get(6)?;
        let created_at: String = row.get(7)?;
        Ok(Memory {
            id: row.get(0)?,
            user_id: row.get(1)?,
            first_chat_log_id: row.get(2)?,
            last_chat_log_id: row.get(3)?,
            content: row.get(4)?,
            keywords,
            last_entry_at: parse_timestamp(&last_entry_at)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::{MemoryDatabase, NewMemory};
    use chrono::Utc;

    fn persist(db: &MemoryDatabase, user_id: i64, first: i64, last: i64) {
        db.persist_window(&NewMemory {
            user_id,
            first_chat_log_id: first,
            last_chat_log_id: last,
            content: format!("summary {}..{}", first, last),
            keywords: vec!["test".to_string()],
            last_entry_at: Utc::now(),
        })
        .unwrap();
    }

    #[test]
    fn recent_memories_are_newest_first_and_limited() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let user_id = db.users.create_user("alice", "pw").unwrap().id;
        persist(&db, user_id, 1, 10);
        persist(&db, user_id, 11, 20);
        persist(&db, user_id, 21, 30);

        let recent = db.memories.recent_memories(user_id, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].last_chat_log_id, 30);
        assert_eq!(recent[1].last_chat_log_id, 20);
    }

    #[test]
    fn latest_covered_id_tracks_the_newest_window() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let user_id = db.users.create_user("alice", "pw").unwrap().id;
        assert_eq!(db.memories.latest_covered_id(user_id).unwrap(), 0);

        persist(&db, user_id, 1, 10);
        persist(&db, user_id, 11, 20);
        assert_eq!(db.memories.latest_covered_id(user_id).unwrap(), 20);
    }

    #[test]
    fn duplicate_ranges_are_rejected_by_the_schema() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let user_id = db.users.create_user("alice", "pw").unwrap().id;
        persist(&db, user_id, 1, 10);

        let dup = db.persist_window(&NewMemory {
            user_id,
            first_chat_log_id: 1,
            last_chat_log_id: 10,
            content: "duplicate".to_string(),
            keywords: vec![],
            last_entry_at: Utc::now(),
        });
        assert!(dup.is_err());
    }
}
