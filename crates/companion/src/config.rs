use anyhow::Result;
use std::env;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub db_path: String,
    pub backend_host: String,
    pub backend_port: u16,
    pub backend_url: String,
    pub summary_model: String,
    pub summary_temperature: f32,
    pub window_size: usize,
    pub memory_limit: usize,
    pub model_timeout_seconds: u64,
    pub unload_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let backend_host = env::var("BACKEND_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let backend_port: u16 = env::var("BACKEND_PORT").unwrap_or_else(|_| "11434".into()).parse()?;
        let backend_url = env::var("BACKEND_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", backend_host, backend_port));

        Ok(Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "32225".into()).parse()?,
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "./data/companion.db".into()),
            backend_host,
            backend_port,
            backend_url,
            summary_model: env::var("SUMMARY_MODEL").unwrap_or_else(|_| "llama3".into()),
            summary_temperature: env::var("SUMMARY_TEMPERATURE")
                .unwrap_or_else(|_| "0.2".into())
                .parse()?,
            window_size: env::var("WINDOW_SIZE").unwrap_or_else(|_| "10".into()).parse()?,
            memory_limit: env::var("MEMORY_LIMIT").unwrap_or_else(|_| "10".into()).parse()?,
            model_timeout_seconds: env::var("MODEL_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "600".into())
                .parse()?,
            unload_timeout_seconds: env::var("UNLOAD_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "1".into())
                .parse()?,
        })
    }

    pub fn print_config(&self) {
        info!("Listening on {}:{}", self.api_host, self.api_port);
        info!("Model backend: {}", self.backend_url);
        info!(
            "Summarization: model '{}', window {}, temperature {}",
            self.summary_model, self.window_size, self.summary_temperature
        );
        info!("Database: {}", self.db_path);
    }
}
