//! # Document Retrieval
//!
//! This crate answers questions from uploaded documents by combining:
//!
//! - **Engine**: a vector index and a fragment store kept positionally aligned
//! - **Persistence**: companion on-disk artifacts written after every mutation
//! - **Synthesis**: prompt templating over retrieved fragments and a generation backend
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Retrieval Facade                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │   Chunker    │  │   Engine     │  │  Persistence │          │
//! │  │              │  │ index+store  │  │   Manager    │          │
//! │  └──────────────┘  └──────────────┘  └──────────────┘          │
//! │         │                │                  │                   │
//! │         └────────────────┼──────────────────┘                   │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │   Answer     │                               │
//! │                  │ Synthesizer  │                               │
//! │                  └──────────────┘                               │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │  Generator   │                               │
//! │                  └──────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docqa_retrieval::{QueryRequest, RetrievalConfig, RetrievalFacade};
//!
//! let facade = RetrievalFacade::open(RetrievalConfig::new("/var/lib/docqa/state")).await?;
//!
//! facade.ingest(&extracted_text, "handbook.pdf").await?;
//! let answer = facade
//!     .query(QueryRequest::new("How many vacation days do I get?").with_top_k(5))
//!     .await?;
//! ```

pub mod chunker;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod fragment;
pub mod generation;
pub mod persistence;
pub mod synthesizer;

#[cfg(test)]
mod test_support;

pub use chunker::{Chunker, FixedWindowChunker};
pub use config::{
    ChunkingConfig, EmbeddingConfig, EmbeddingProviderType, GenerationConfig, QueryConfig,
    RetrievalConfig,
};
pub use engine::{EngineStats, RetrievalEngine, RetrievalResult};
pub use error::{Result, RetrievalError};
pub use facade::{
    ChunkView, DeleteReport, DocumentDetails, IngestReport, QueryRequest, RetrievalFacade,
    RetrievalFacadeBuilder, StartupState, Stats,
};
pub use fragment::{Fragment, FragmentStore};
pub use generation::{Generator, OllamaGenerator};
pub use persistence::{PersistedState, PersistenceManager};
pub use synthesizer::{Answer, AnswerOutcome, AnswerSynthesizer, Template};

// Re-export from dependencies for convenience
pub use docqa_embeddings::{EmbeddingProvider, VectorIndex};
