//! Server startup and routing.
//!
//! Route paths keep the legacy `/async/*` prefix the deployed clients use.
use std::sync::Arc;
use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::memory_db::MemoryDatabase;
use crate::state::AppState;

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    cfg.print_config();

    // A database that cannot be opened is fatal: running on without durable
    // storage would silently drop every chat row and memory.
    let db_path = std::path::Path::new(&cfg.db_path);
    let db = Arc::new(
        MemoryDatabase::new(db_path)
            .with_context(|| format!("Failed to open database at {}", cfg.db_path))?,
    );

    let addr = format!("{}:{}", cfg.api_host, cfg.api_port);
    let state = AppState::new(cfg, db);
    let app = build_router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> axum::Router {
    use axum::{
        routing::{get, post},
        Router,
    };
    use tower_http::{
        cors::{Any, CorsLayer},
        timeout::TimeoutLayer,
        trace::TraceLayer,
    };
    use std::time::Duration;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    Router::new()
        // Async dispatch/poll queue
        .route("/async/chat", post(crate::api::chat_api::enqueue_chat))
        .route("/async/response", get(crate::api::chat_api::poll_response))
        // Chat log
        .route("/async/storeChatLog", post(crate::api::chat_log_api::store_chat_log))
        .route("/async/getChatLog", get(crate::api::chat_log_api::get_chat_log))
        // Memory pipeline
        .route("/async/generateMemories", get(crate::api::memory_api::generate_memories))
        .route(
            "/async/retrieveDiscussion",
            get(crate::api::memory_api::retrieve_discussion)
                .post(crate::api::memory_api::retrieve_discussion),
        )
        // Accounts
        .route("/async/login", post(crate::api::auth_api::login))
        // Backend passthroughs
        .route("/async/tags", get(crate::api::proxy_api::tags))
        .route("/async/ps", get(crate::api::proxy_api::ps))
        .route("/async/unload", post(crate::api::proxy_api::unload))
        // Load balancer health check
        .route("/", get(|| async { "still alive" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(600)))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let cfg = Config {
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            db_path: ":memory:".to_string(),
            backend_host: "127.0.0.1".to_string(),
            backend_port: 1,
            // Unroutable on purpose: these tests never reach the backend.
            backend_url: "http://127.0.0.1:1".to_string(),
            summary_model: "test".to_string(),
            summary_temperature: 0.2,
            window_size: 10,
            memory_limit: 10,
            model_timeout_seconds: 5,
            unload_timeout_seconds: 1,
        };
        let db = Arc::new(MemoryDatabase::new_in_memory().unwrap());
        AppState::new(cfg, db)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_answers_still_alive() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"still alive".as_slice());
    }

    #[tokio::test]
    async fn login_issues_a_token_and_rejects_bad_credentials() {
        let state = test_state();
        state.db.users.create_user("alice", "hunter2").unwrap();
        let app = build_router(state);

        let ok = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/async/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"username":"alice","password":"hunter2"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = body_json(ok).await;
        assert_eq!(body["result"], true);
        assert!(!body["csrf_token"].as_str().unwrap().is_empty());

        let denied = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/async/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"username":"alice","password":"wrong"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(denied).await;
        assert_eq!(body["result"], false);
    }

    #[tokio::test]
    async fn chat_log_round_trip_requires_the_csrf_header() {
        let state = test_state();
        let user = state.db.users.create_user("alice", "pw").unwrap();
        let token = state.db.users.issue_csrf(user.id).unwrap();
        let app = build_router(state);

        // Without the header: rejected, nothing stored.
        let denied = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/async/storeChatLog")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"persona":"Pixel","role":"user","content":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let stored = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/async/storeChatLog")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("X-CSRF-TOKEN", &token)
                    .body(Body::from(r#"{"persona":"Pixel","role":"user","content":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(stored.status(), StatusCode::OK);

        let log = app
            .oneshot(
                Request::builder()
                    .uri("/async/getChatLog")
                    .header("X-CSRF-TOKEN", &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(log.status(), StatusCode::OK);
        let body = body_json(log).await;
        assert_eq!(body[0]["content"], "hi");
    }

    #[tokio::test]
    async fn empty_chat_log_returns_the_placeholder_row() {
        let state = test_state();
        let user = state.db.users.create_user("alice", "pw").unwrap();
        let token = state.db.users.issue_csrf(user.id).unwrap();
        let app = build_router(state);

        let log = app
            .oneshot(
                Request::builder()
                    .uri("/async/getChatLog")
                    .header("X-CSRF-TOKEN", &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(log).await;
        assert_eq!(body[0]["persona"], "nobody");
        assert_eq!(body[0]["content"], "nothing to show");
    }

    #[tokio::test]
    async fn enqueue_rejects_non_json_payloads_without_side_effects() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/async/chat")
                    .body(Body::from("definitely not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn polling_an_unknown_token_returns_the_not_found_sentinel() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/async/response?uid=no-such-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["model"], "not found");
    }

    #[tokio::test]
    async fn retrieve_discussion_for_a_fresh_user_is_empty() {
        let state = test_state();
        let user = state.db.users.create_user("alice", "pw").unwrap();
        let token = state.db.users.issue_csrf(user.id).unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/async/retrieveDiscussion")
                    .header("X-CSRF-TOKEN", &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!([]));
    }
}
