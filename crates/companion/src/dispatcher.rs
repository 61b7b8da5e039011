//! Async dispatch queue: one detached unit of work per inference request.
//!
//! `enqueue` inserts a pending job row and returns a token immediately; a
//! spawned task carries the caller's prompt bytes to the model backend and
//! writes the outcome back as the job's terminal state. The caller retrieves
//! the result later through the destructive poll in `JobStore::consume`.
use std::sync::Arc;
use bytes::Bytes;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backend::ModelBackend;
use crate::memory_db::MemoryDatabase;

pub struct Dispatcher {
    db: Arc<MemoryDatabase>,
    backend: Arc<ModelBackend>,
}

impl Dispatcher {
    pub fn new(db: Arc<MemoryDatabase>, backend: Arc<ModelBackend>) -> Self {
        Self { db, backend }
    }

    /// Create the job row and fire the background model call. Returns the
    /// poll token as soon as the row exists; the caller never waits on the
    /// backend. No cancellation is exposed: once spawned, the task runs to a
    /// terminal state on its own.
    pub fn enqueue(&self, body: Bytes) -> anyhow::Result<String> {
        let token = Uuid::new_v4().to_string();
        let prompt = String::from_utf8_lossy(&body).into_owned();
        self.db.jobs.insert_pending(&token, &prompt)?;
        info!("Dispatching job {}", token);

        let db = Arc::clone(&self.db);
        let backend = Arc::clone(&self.backend);
        let job_token = token.clone();
        tokio::spawn(async move {
            Self::run_job(db, backend, job_token, body).await;
        });

        Ok(token)
    }

    async fn run_job(db: Arc<MemoryDatabase>, backend: Arc<ModelBackend>, token: String, body: Bytes) {
        let outcome = match backend.chat_raw(body).await {
            Ok(answer) => {
                // A body that is not JSON would poison the poll endpoint, so a
                // malformed backend answer is recorded as a failure instead of
                // masquerading as still-processing.
                match std::str::from_utf8(&answer) {
                    Ok(text) if serde_json::from_str::<serde_json::Value>(text).is_ok() => {
                        db.jobs.mark_succeeded(&token, text)
                    }
                    _ => db.jobs.mark_failed(&token, "model backend returned a non-JSON body"),
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", token, e);
                db.jobs.mark_failed(&token, &e.to_string())
            }
        };
        if let Err(e) = outcome {
            // The caller's connection is long gone; the stuck row itself is
            // the only observable trace.
            error!("Failed to record result for job {}: {}", token, e);
        } else {
            debug!("Job {} reached a terminal state", token);
        }
    }
}
