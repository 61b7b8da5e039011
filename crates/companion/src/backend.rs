//! HTTP client for the local Ollama-style model backend.
//!
//! The gateway only depends on a narrow contract: prompt in, text out,
//! model selectable, non-streaming mode. Everything else the backend
//! returns is forwarded or ignored.
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    options: GenerateOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Response envelope. `/api/generate` answers with `response`,
/// `/api/chat` with `message.content`; accept either.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    message: Option<BackendMessage>,
}

#[derive(Debug, Deserialize)]
struct BackendMessage {
    content: String,
}

pub struct ModelBackend {
    base_url: String,
    http_client: reqwest::Client,
    unload_client: reqwest::Client,
}

impl ModelBackend {
    pub fn new(base_url: String, timeout_secs: u64, unload_timeout_secs: u64) -> Self {
        info!("Model backend initialized at: {}", base_url);
        Self {
            base_url,
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            // Deliberately tiny timeout: the unload call only has to reach the
            // backend, its answer is irrelevant.
            unload_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(unload_timeout_secs.max(1)))
                .build()
                .unwrap_or_default(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Forward the caller's chat envelope untouched and return the raw body.
    /// Transport failures and non-2xx statuses are errors; the dispatcher
    /// records them as the job's terminal state.
    pub async fn chat_raw(&self, body: Bytes) -> anyhow::Result<Bytes> {
        debug!("Forwarding chat request to model backend ({} bytes)", body.len());
        let response = self
            .http_client
            .post(self.chat_url())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Model backend request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Model backend returned {}: {}", status, body));
        }
        Ok(response.bytes().await?)
    }

    /// One-shot non-streaming completion, used by the summarization pipeline.
    pub async fn generate(&self, model: &str, prompt: &str, temperature: f32) -> anyhow::Result<String> {
        debug!("Generate call to model '{}' ({} chars)", model, prompt.len());
        let request = GenerateRequest {
            model,
            prompt,
            options: GenerateOptions { temperature },
            stream: false,
        };
        let response = self
            .http_client
            .post(self.generate_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Model backend request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Model backend returned {}: {}", status, body));
        }
        let envelope: GenerateResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse model response: {}", e))?;
        envelope
            .response
            .or(envelope.message.map(|m| m.content))
            .ok_or_else(|| anyhow::anyhow!("Model response carried no text"))
    }

    /// Raw passthrough of the backend's model list.
    pub async fn tags(&self) -> anyhow::Result<Bytes> {
        self.passthrough_get(format!("{}/api/tags", self.base_url)).await
    }

    /// Raw passthrough of the backend's loaded-model status.
    pub async fn ps(&self) -> anyhow::Result<Bytes> {
        self.passthrough_get(format!("{}/api/ps", self.base_url)).await
    }

    async fn passthrough_get(&self, url: String) -> anyhow::Result<Bytes> {
        let response = self
            .http_client
            .get(&url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Model backend request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Model backend returned {}", response.status()));
        }
        Ok(response.bytes().await?)
    }

    /// Ask the backend to unload its model. The request is expected to time
    /// out; the backend acts on receipt, so failures are only logged.
    pub async fn unload(&self, body: Bytes) {
        let result = self
            .unload_client
            .post(self.chat_url())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await;
        if let Err(e) = result {
            warn!("Unload request did not complete (usually harmless): {}", e);
        }
    }
}
