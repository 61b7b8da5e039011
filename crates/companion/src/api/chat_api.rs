//! Async inference endpoints: enqueue a chat job, poll for its result
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::memory_db::PollOutcome;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    #[serde(rename = "uniqueID")]
    pub unique_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PollParams {
    pub uid: String,
}

/// Accept a chat envelope, hand it to the dispatcher and return the poll
/// token immediately. The payload is forwarded to the backend untouched, but
/// it must at least be JSON.
pub async fn enqueue_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EnqueueResponse>, Response> {
    if serde_json::from_slice::<Value>(&body).is_err() {
        return Err((StatusCode::BAD_REQUEST, "Invalid JSON payload").into_response());
    }

    match state.dispatcher.enqueue(body) {
        Ok(unique_id) => Ok(Json(EnqueueResponse { unique_id })),
        Err(e) => {
            error!("Failed to enqueue chat job: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
        }
    }
}

/// Destructive poll. Sentinel envelopes keep the legacy wire shape: callers
/// key off the `model` field to tell status answers from real completions.
pub async fn poll_response(
    State(state): State<AppState>,
    Query(params): Query<PollParams>,
) -> Result<Json<Value>, Response> {
    match state.db.jobs.consume(&params.uid) {
        Ok(PollOutcome::NotFound) => Ok(Json(serde_json::json!({ "model": "not found" }))),
        Ok(PollOutcome::StillProcessing) => {
            Ok(Json(serde_json::json!({ "model": "still processing" })))
        }
        Ok(PollOutcome::Failed(error)) => {
            Ok(Json(serde_json::json!({ "model": "failed", "error": error })))
        }
        Ok(PollOutcome::Completed(answer)) => Ok(Json(answer)),
        Err(e) => {
            error!("Failed to poll job {}: {}", params.uid, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
        }
    }
}
