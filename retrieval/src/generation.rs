//! Language-model generation backends.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, RetrievalError};

/// Turns a prompt into text using a named model.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt` with `model`.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

/// Ollama generation backend (`POST /api/generate`, non-streaming).
pub struct OllamaGenerator {
    /// Server base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,
}

impl OllamaGenerator {
    /// Create a generator for the default local Ollama server.
    pub fn new() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for OllamaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        debug!("Generating answer with model: {model}");

        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Generation(format!(
                "ollama returned {status}: {error_text}"
            )));
        }

        let result: OllamaGenerateResponse = response.json().await?;
        Ok(result.response)
    }
}
