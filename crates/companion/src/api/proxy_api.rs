//! Thin passthroughs to the model backend's list/status/unload endpoints
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::state::AppState;

fn json_body(bytes: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], bytes).into_response()
}

pub async fn tags(State(state): State<AppState>) -> Response {
    match state.backend.tags().await {
        Ok(body) => json_body(body),
        Err(e) => {
            error!("Tags passthrough failed: {}", e);
            (StatusCode::BAD_GATEWAY, "Model backend unavailable").into_response()
        }
    }
}

pub async fn ps(State(state): State<AppState>) -> Response {
    match state.backend.ps().await {
        Ok(body) => json_body(body),
        Err(e) => {
            error!("PS passthrough failed: {}", e);
            (StatusCode::BAD_GATEWAY, "Model backend unavailable").into_response()
        }
    }
}

/// Forward an unload envelope and answer 200 regardless: the backend acts on
/// receipt and the response is expected to time out.
pub async fn unload(State(state): State<AppState>, body: Bytes) -> Response {
    state.backend.unload(body).await;
    StatusCode::OK.into_response()
}
