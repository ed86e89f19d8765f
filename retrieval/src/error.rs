//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// A vector did not match the engine dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Referenced document or fragment is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A filter named documents that are not stored.
    #[error("unknown documents: {}", .0.join(", "))]
    UnknownDocument(Vec<String>),

    /// Persisted artifacts exist but disagree with each other.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// The generation backend failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Caller supplied an unusable argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding provider error.
    #[error("embedding error: {0}")]
    Embedding(docqa_embeddings::EmbeddingError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<docqa_embeddings::EmbeddingError> for RetrievalError {
    fn from(err: docqa_embeddings::EmbeddingError) -> Self {
        match err {
            docqa_embeddings::EmbeddingError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            other => Self::Embedding(other),
        }
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(err: reqwest::Error) -> Self {
        Self::Generation(err.to_string())
    }
}
