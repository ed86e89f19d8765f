//! Embedding providers.
//!
//! The rest of the system treats embedding as an opaque call: text in,
//! fixed-length vector out. Providers here talk to a local Ollama server or
//! any OpenAI-compatible embeddings endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Dimension of the vectors this provider returns.
    fn dimension(&self) -> usize;

    /// Generate an embedding for the given text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for multiple texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        // Default implementation: process sequentially
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Ollama embedding provider (`POST /api/embeddings`).
pub struct OllamaProvider {
    /// Server base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Embedding model name.
    model: String,

    /// Dimension the model produces.
    dimension: usize,
}

impl OllamaProvider {
    /// Create a provider for the default local Ollama server.
    pub fn new() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            client: reqwest::Client::new(),
            model: "all-minilm".to_string(),
            dimension: crate::DEFAULT_DIMENSION,
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model and the dimension it produces.
    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        debug!("Generating embedding with model: {}", self.model);

        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "ollama returned {status}: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await?;
        if result.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "empty embedding in response".to_string(),
            ));
        }

        Ok(result.embedding)
    }
}

/// OpenAI-compatible embedding provider (`POST /embeddings`).
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Embedding model name.
    model: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider, reading `OPENAI_API_KEY` from the environment.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: "text-embedding-3-small".to_string(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn request(&self, input: serde_json::Value) -> Result<Vec<Embedding>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::MissingApiKey { provider: "openai" })?;

        let body = serde_json::json!({
            "input": input,
            "model": self.model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error: {error_text}"
            )));
        }

        let mut result: OpenAIEmbeddingResponse = response.json().await?;
        // The API may return items out of order; `index` is authoritative.
        result.data.sort_by_key(|item| item.index);
        Ok(result.data.into_iter().map(|item| item.embedding).collect())
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        debug!("Generating embedding with model: {}", self.model);

        self.request(serde_json::json!(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.request(serde_json::json!(texts)).await?;
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::BatchSizeMismatch {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }

        info!("Generated {} batch embeddings", embeddings.len());
        Ok(embeddings)
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
