//! Async job queue rows: enqueue, complete, destructive single-consumer poll
use crate::memory_db::schema::*;
use rusqlite::params;
use chrono::Utc;
use tracing::{debug, warn};
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

/// Outcome of consuming a job token.
///
/// `Completed` and `Failed` are returned at most once per token; the row is
/// deleted before either is handed out. `NotFound` covers both never-existed
/// and already-consumed tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    NotFound,
    StillProcessing,
    Failed(String),
    Completed(serde_json::Value),
}

pub struct JobStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl JobStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Insert a fresh pending row for a newly issued token.
    pub fn insert_pending(&self, uuid: &str, prompt: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO jobs (uuid, prompt, status, answer, created_at) VALUES (?1, ?2, ?3, NULL, ?4)",
            params![uuid, prompt, JobStatus::Pending.as_str(), format_timestamp(Utc::now())],
        )?;
        debug!("Enqueued job {}", uuid);
        Ok(())
    }

    /// Record the backend's answer. Only ever called once per job, by the dispatcher.
    pub fn mark_succeeded(&self, uuid: &str, answer: &str) -> anyhow::Result<()> {
        self.set_terminal_state(uuid, JobStatus::Succeeded, answer)
    }

    /// Record a terminal failure so polling can distinguish it from still-running.
    pub fn mark_failed(&self, uuid: &str, error: &str) -> anyhow::Result<()> {
        self.set_terminal_state(uuid, JobStatus::Failed, error)
    }

    fn set_terminal_state(&self, uuid: &str, status: JobStatus, answer: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE jobs SET status = ?1, answer = ?2 WHERE uuid = ?3 AND status = 'pending'",
            params![status.as_str(), answer, uuid],
        )?;
        if updated == 0 {
            // Row already consumed or never enqueued; nothing to write back to.
            warn!("Job {} vanished before its {} result could be stored", uuid, status.as_str());
        }
        Ok(())
    }

    /// Destructive poll: a terminal row is deleted before its outcome is returned,
    /// so each result is observable exactly once.
    pub fn consume(&self, uuid: &str) -> anyhow::Result<PollOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let row: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT status, answer FROM jobs WHERE uuid = ?1",
                [uuid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let (status, answer) = match row {
            Some(r) => r,
            None => return Ok(PollOutcome::NotFound),
        };

        let outcome = match JobStatus::parse(&status)? {
            JobStatus::Pending => return Ok(PollOutcome::StillProcessing),
            JobStatus::Failed => {
                PollOutcome::Failed(answer.unwrap_or_else(|| "unknown error".to_string()))
            }
            JobStatus::Succeeded => {
                let body = answer.unwrap_or_default();
                match serde_json::from_str(&body) {
                    Ok(value) => PollOutcome::Completed(value),
                    // The dispatcher validates the body before marking success,
                    // so this only fires on a corrupted row.
                    Err(e) => PollOutcome::Failed(format!("stored answer is not valid JSON: {}", e)),
                }
            }
        };

        tx.execute("DELETE FROM jobs WHERE uuid = ?1", [uuid])?;
        tx.commit()?;
        debug!("Consumed job {}", uuid);
        Ok(outcome)
    }

    /// Load a job without consuming it. Diagnostic helper, not part of the poll path.
    pub fn get(&self, uuid: &str) -> anyhow::Result<Option<AsyncJob>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, prompt, status, answer, created_at FROM jobs WHERE uuid = ?1",
        )?;
        let mut rows = stmt.query([uuid])?;
        if let Some(row) = rows.next()? {
            let status: String = row.get(2)?;
            let created_at: String = row.get(4)?;
            Ok(Some(AsyncJob {
                uuid: row.get(0)?,
                prompt: row.get(1)?,
                status: JobStatus::parse(&status)?,
                answer: row.get(3)?,
                created_at: parse_timestamp(&created_at)?,
            }))
        } else {
            Ok(None)
        }
    }
}
