//! # Embeddings
//!
//! This crate provides the vector side of document question answering:
//! turning text into fixed-dimension vectors and finding the nearest stored
//! vectors for a query.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through an
//!   [`EmbeddingProvider`] (Ollama, OpenAI-compatible endpoints)
//! - **Exact Search**: Brute-force nearest neighbours by squared L2 distance
//! - **Rebuild**: Positional index that is replaced wholesale, never edited
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► VectorIndex               │
//! │       │                                  │                      │
//! │       ▼                                  ▼                      │
//! │  Ollama/OpenAI                  squared_l2 ─► similarity        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use index::{Neighbor, VectorIndex};
pub use provider::{EmbeddingProvider, OllamaProvider, OpenAIProvider};
pub use similarity::{distance_to_similarity, squared_l2};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings produced by all-MiniLM-L6-v2.
pub const DEFAULT_DIMENSION: usize = 384;
