//! Database schema definitions for the companion gateway
use serde::{Deserialize, Serialize};
use chrono::{DateTime, SecondsFormat, Utc};

/// Terminal and non-terminal states of an async inference job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(anyhow::anyhow!("Unknown job status: {}", other)),
        }
    }
}

/// One asynchronous inference request, tracked from enqueue to consumption.
#[derive(Debug, Clone)]
pub struct AsyncJob {
    pub uuid: String,
    pub prompt: String,
    pub status: JobStatus,
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single row of the append-only per-user chat log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub id: i64,
    pub user_id: i64,
    pub persona: String,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub summarized: bool,
}

/// A persisted summary of one chat window plus extracted keywords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub user_id: i64,
    pub first_chat_log_id: i64,
    pub last_chat_log_id: i64,
    pub content: String,
    pub keywords: Vec<String>,
    pub last_entry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Account row. Password digests only; auth strength is out of scope.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// Fixed-width RFC 3339 so SQLite string comparison matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow::anyhow!("Failed to parse timestamp '{}': {}", s, e))?
        .with_timezone(&Utc))
}

pub const SCHEMA_SQL: &str = "
-- Async job queue
CREATE TABLE IF NOT EXISTS jobs (
    uuid TEXT PRIMARY KEY,
    prompt TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    answer TEXT,
    created_at TIMESTAMP NOT NULL
);
-- Append-only chat log
CREATE TABLE IF NOT EXISTS chat_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    persona TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TIMESTAMP NOT NULL,
    summarized BOOLEAN NOT NULL DEFAULT FALSE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
-- Long-term memories distilled from chat windows
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    first_chat_log_id INTEGER NOT NULL,
    last_chat_log_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    keywords TEXT NOT NULL,
    last_entry_at TIMESTAMP NOT NULL,
    created_at TIMESTAMP NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    UNIQUE(user_id, first_chat_log_id, last_chat_log_id)
);
-- Accounts
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    csrf TEXT
);
-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_chat_log_user ON chat_log (user_id);
CREATE INDEX IF NOT EXISTS idx_chat_log_unsummarized ON chat_log (user_id, summarized, id);
CREATE INDEX IF NOT EXISTS idx_memories_user ON memories (user_id, last_chat_log_id);
CREATE INDEX IF NOT EXISTS idx_users_csrf ON users (csrf);
";
