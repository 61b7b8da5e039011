//! Memory endpoints: trigger summarization, retrieve the reconstructed discussion
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::{error, info};

use crate::api::auth_api::require_user;
use crate::discussion::{reconstruct_discussion, DiscussionMessage};
use crate::state::AppState;

/// Fire-and-forget summarization trigger: the loop runs in a spawned task and
/// the caller gets its 200 before the first model call goes out. A trigger
/// that lands while a run is active is absorbed by the per-user lock.
pub async fn generate_memories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    let user_id = require_user(&state, &headers)?;
    info!("Summarization triggered for user {}", user_id);
    state.summarizer.spawn_run(user_id);
    Ok(Json(serde_json::json!({ "status": "accepted" })))
}

/// Merged view of recent memories plus the unsummarized tail.
pub async fn retrieve_discussion(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DiscussionMessage>>, Response> {
    let user_id = require_user(&state, &headers)?;

    match reconstruct_discussion(&state.db, user_id, state.config.memory_limit) {
        Ok(messages) => Ok(Json(messages)),
        Err(e) => {
            error!("Failed to reconstruct discussion for user {}: {}", user_id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
        }
    }
}
