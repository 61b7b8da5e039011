//! Login and CSRF token handling
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::state::AppState;

pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResult {
    pub result: bool,
    pub csrf_token: String,
}

impl LoginResult {
    fn denied() -> Self {
        Self { result: false, csrf_token: String::new() }
    }
}

/// Verify credentials and rotate the caller's CSRF token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResult>, Response> {
    let user_id = match state.db.users.verify_login(&req.username, &req.password) {
        Ok(Some(id)) => id,
        Ok(None) => {
            info!("Rejected login for '{}'", req.username);
            return Err((StatusCode::UNAUTHORIZED, Json(LoginResult::denied())).into_response());
        }
        Err(e) => {
            error!("Login lookup failed: {}", e);
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response());
        }
    };

    match state.db.users.issue_csrf(user_id) {
        Ok(csrf_token) => {
            info!("User '{}' logged in", req.username);
            Ok(Json(LoginResult { result: true, csrf_token }))
        }
        Err(e) => {
            error!("Failed to issue CSRF token: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
        }
    }
}

/// Resolve the caller from the CSRF header. Missing or unknown tokens get the
/// same 401 body the login endpoint uses, with no state touched.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<i64, Response> {
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.db.users.user_id_for_csrf(token) {
        Ok(Some(user_id)) => Ok(user_id),
        Ok(None) => Err((StatusCode::UNAUTHORIZED, Json(LoginResult::denied())).into_response()),
        Err(e) => {
            error!("CSRF lookup failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
        }
    }
}
