//! Chat log endpoints: append a row, fetch the raw ordered history
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::api::auth_api::require_user;
use crate::memory_db::chat_log_store::is_known_role;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StoreChatLogRequest {
    pub persona: String,
    pub role: String,
    pub content: String,
}

/// Chat log row as the legacy clients expect it.
#[derive(Debug, Serialize)]
pub struct ChatLogMessage {
    pub id: i64,
    pub persona: String,
    pub role: String,
    pub content: String,
}

pub async fn store_chat_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StoreChatLogRequest>,
) -> Result<Json<Value>, Response> {
    let user_id = require_user(&state, &headers)?;

    if !is_known_role(&req.role) {
        return Err((StatusCode::BAD_REQUEST, format!("Unknown role: {}", req.role)).into_response());
    }

    match state.db.chat_log.append(user_id, &req.persona, &req.role, &req.content, Utc::now()) {
        Ok(id) => Ok(Json(serde_json::json!({ "success": true, "id": id }))),
        Err(e) => {
            error!("Failed to store chat log row for user {}: {}", user_id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
        }
    }
}

pub async fn get_chat_log(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatLogMessage>>, Response> {
    let user_id = require_user(&state, &headers)?;

    match state.db.chat_log.entries_for_user(user_id) {
        Ok(entries) => {
            let mut messages: Vec<ChatLogMessage> = entries
                .into_iter()
                .map(|e| ChatLogMessage { id: e.id, persona: e.persona, role: e.role, content: e.content })
                .collect();
            // Legacy placeholder so empty histories still render a row.
            if messages.is_empty() {
                messages.push(ChatLogMessage {
                    id: 0,
                    persona: "nobody".to_string(),
                    role: "user".to_string(),
                    content: "nothing to show".to_string(),
                });
            }
            Ok(Json(messages))
        }
        Err(e) => {
            error!("Failed to fetch chat log for user {}: {}", user_id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
        }
    }
}
