//! Error types for embedding providers and the vector index.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur while embedding text or searching vectors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The provider needs an API key and none was set.
    #[error("{provider} API key not set")]
    MissingApiKey { provider: &'static str },

    /// The provider answered with a non-success status.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The provider answered with a body we could not use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The provider returned a different number of vectors than texts sent.
    #[error("expected {expected} embeddings, got {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A vector did not have the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector held a NaN or infinite component.
    #[error("non-finite value at component {component}")]
    NonFiniteComponent { component: usize },

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
