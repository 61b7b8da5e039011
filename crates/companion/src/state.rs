//! Shared application state: every subsystem behind an `Arc`, handed to each
//! handler through Axum's `State` extractor rather than process-wide globals.
use std::sync::Arc;

use crate::backend::ModelBackend;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::memory_db::MemoryDatabase;
use crate::summarizer::Summarizer;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<MemoryDatabase>,
    pub backend: Arc<ModelBackend>,
    pub dispatcher: Arc<Dispatcher>,
    pub summarizer: Arc<Summarizer>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<MemoryDatabase>) -> Self {
        let config = Arc::new(config);
        let backend = Arc::new(ModelBackend::new(
            config.backend_url.clone(),
            config.model_timeout_seconds,
            config.unload_timeout_seconds,
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&db), Arc::clone(&backend)));
        let summarizer = Arc::new(Summarizer::new(
            Arc::clone(&db),
            Arc::clone(&backend),
            config.summary_model.clone(),
            config.summary_temperature,
            config.window_size,
        ));
        Self { db, backend, dispatcher, summarizer, config }
    }
}
