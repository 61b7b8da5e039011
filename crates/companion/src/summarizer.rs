//! Progressive summarization: segment the unsummarized chat tail into fixed
//! windows, distill each window into a memory via two model calls, and flip
//! the consumed rows atomically with the memory insert.
//!
//! Runs are serialized per user. Two triggers arriving back to back must not
//! compute windows against the same tail, so the second one bails out while
//! the first holds the user's lock.
use std::sync::Arc;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::backend::ModelBackend;
use crate::memory_db::{ChatLogEntry, MemoryDatabase, NewMemory};
use crate::memory_db::chat_log_store::{ROLE_ASSISTANT, ROLE_SYSTEM};

/// One bounded window of unsummarized chat rows, rendered for the model.
#[derive(Debug, Clone)]
pub struct Segment {
    pub rendered: String,
    pub first_id: i64,
    pub last_id: i64,
    pub last_entry_at: DateTime<Utc>,
    /// Non-system rows included; system rows are skipped without counting.
    pub count: usize,
}

pub struct Summarizer {
    db: Arc<MemoryDatabase>,
    backend: Arc<ModelBackend>,
    model: String,
    temperature: f32,
    window_size: usize,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Summarizer {
    pub fn new(
        db: Arc<MemoryDatabase>,
        backend: Arc<ModelBackend>,
        model: String,
        temperature: f32,
        window_size: usize,
    ) -> Self {
        Self {
            db,
            backend,
            model,
            temperature,
            window_size: window_size.max(1),
            locks: DashMap::new(),
        }
    }

    fn render_entry(entry: &ChatLogEntry, username: &str) -> String {
        let speaker = if entry.role == ROLE_ASSISTANT { entry.persona.as_str() } else { username };
        format!("{} said '\n{}\n'\n\n", speaker, entry.content)
    }

    /// Cut the next window out of the unsummarized tail. Reads the summarized
    /// flags fresh from the database on every call, so rows consumed by an
    /// earlier window can never reappear. Returns `None` when the tail holds
    /// no non-system rows at all.
    pub fn next_segment(
        &self,
        user_id: i64,
        after_id: i64,
        username: &str,
    ) -> anyhow::Result<Option<Segment>> {
        let tail = self.db.chat_log.unsummarized_tail(user_id, after_id)?;

        let mut rendered = String::new();
        let mut first_id = None;
        let mut last_id = 0;
        let mut last_entry_at = Utc::now();
        let mut count = 0;

        for entry in &tail {
            if entry.role == ROLE_SYSTEM {
                continue;
            }
            rendered.push_str(&Self::render_entry(entry, username));
            first_id.get_or_insert(entry.id);
            last_id = entry.id;
            last_entry_at = entry.timestamp;
            count += 1;
            if count == self.window_size {
                break;
            }
        }

        match first_id {
            None => Ok(None),
            Some(first_id) => Ok(Some(Segment { rendered, first_id, last_id, last_entry_at, count })),
        }
    }

    fn summary_prompt(&self, segment: &Segment) -> String {
        format!(
            "{}Summarize the conversation above in one short paragraph. \
             Keep every personal fact, preference and decision. \
             Respond with the summary only.",
            segment.rendered
        )
    }

    fn keyword_prompt(&self, summary: &str) -> String {
        format!(
            "{}\n\nExtract the most important keywords from the text above \
             as a comma separated list. Respond with the list only.",
            summary
        )
    }

    /// Summarize every full window in the user's unsummarized tail.
    ///
    /// A final window below `window_size` is held back until enough rows
    /// accumulate. Each window is persisted only after both model calls
    /// succeed, and the memory insert plus the summarized flips are one
    /// transaction, so any failure leaves the remaining tail retryable.
    /// Returns the number of memories created; returns immediately with 0 if
    /// a run for this user is already active.
    pub async fn run(&self, user_id: i64) -> anyhow::Result<usize> {
        let lock = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Summarization already running for user {}, skipping trigger", user_id);
                return Ok(0);
            }
        };

        let username = self
            .db
            .users
            .username_for_id(user_id)?
            .ok_or_else(|| anyhow::anyhow!("User {} not found", user_id))?;

        // Rows at or below the highest covered id are either flipped already
        // or system rows with nothing to contribute, so the scan starts past
        // them rather than re-walking the whole log every run.
        let mut after_id = self.db.memories.latest_covered_id(user_id)?;
        let mut created = 0;

        loop {
            let segment = match self.next_segment(user_id, after_id, &username)? {
                Some(segment) => segment,
                None => break,
            };
            if segment.count < self.window_size {
                debug!(
                    "Holding back partial window of {} rows for user {} (threshold {})",
                    segment.count, user_id, self.window_size
                );
                break;
            }

            let summary = self
                .backend
                .generate(&self.model, &self.summary_prompt(&segment), self.temperature)
                .await?;
            let keywords_text = self
                .backend
                .generate(&self.model, &self.keyword_prompt(&summary), self.temperature)
                .await?;
            let keywords = parse_keywords(&keywords_text);

            self.db.persist_window(&NewMemory {
                user_id,
                first_chat_log_id: segment.first_id,
                last_chat_log_id: segment.last_id,
                content: summary,
                keywords,
                last_entry_at: segment.last_entry_at,
            })?;

            created += 1;
            after_id = segment.last_id;
        }

        info!("Summarization for user {} created {} memories", user_id, created);
        Ok(created)
    }

    /// Fire-and-forget trigger for the HTTP surface: the caller gets its 200
    /// before the first model call goes out.
    pub fn spawn_run(self: &Arc<Self>, user_id: i64) {
        let summarizer = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = summarizer.run(user_id).await {
                error!("Background summarization for user {} failed: {}", user_id, e);
            }
        });
    }
}

/// Parse the model's keyword answer into a clean list. Models answer comma
/// separated lists with uneven whitespace, stray quotes and list dashes.
pub fn parse_keywords(text: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for raw in text.split(|c| c == ',' || c == '\n') {
        let cleaned = raw
            .trim()
            .trim_start_matches(['-', '*', '\u{2022}'])
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c.is_whitespace());
        if !cleaned.is_empty() && !keywords.iter().any(|k| k == cleaned) {
            keywords.push(cleaned.to_string());
        }
    }
    keywords
}
