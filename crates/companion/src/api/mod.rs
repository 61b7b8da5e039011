//! API module - HTTP surface of the companion gateway

pub mod auth_api;
pub mod chat_api;
pub mod chat_log_api;
pub mod memory_api;
pub mod proxy_api;

pub use auth_api::{login, LoginRequest, LoginResult};
pub use chat_api::{enqueue_chat, poll_response, EnqueueResponse};
pub use chat_log_api::{get_chat_log, store_chat_log};
pub use memory_api::{generate_memories, retrieve_discussion};
pub use proxy_api::{ps, tags, unload};
