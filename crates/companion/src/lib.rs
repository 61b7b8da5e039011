pub mod api;
pub mod backend;
pub mod config;
pub mod discussion;
pub mod dispatcher;
pub mod memory_db;
pub mod server;
pub mod state;
pub mod summarizer;
pub mod telemetry;

// Public API exports
pub use backend::ModelBackend;
pub use config::Config;
pub use discussion::{reconstruct_discussion, DiscussionMessage};
pub use dispatcher::Dispatcher;
pub use memory_db::{MemoryDatabase, PollOutcome};
pub use server::{build_router, run_server};
pub use state::AppState;
pub use summarizer::{Segment, Summarizer};
