//! Configuration for the retrieval engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Configuration for the retrieval facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Base path of the persisted state; companion artifacts share this stem.
    pub state_path: PathBuf,

    /// Dimension of every stored embedding.
    pub dimension: usize,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Answer generation configuration.
    pub generation: GenerationConfig,

    /// Query processing configuration.
    pub query: QueryConfig,

    /// Chunking configuration.
    pub chunking: ChunkingConfig,

    /// Accepted document name extensions. Empty accepts every name.
    pub allowed_extensions: Vec<String>,
}

impl RetrievalConfig {
    /// Create a new configuration with default values.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            dimension: docqa_embeddings::DEFAULT_DIMENSION,
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            query: QueryConfig::default(),
            chunking: ChunkingConfig::default(),
            allowed_extensions: Vec::new(),
        }
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the generation model.
    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation.model = model.into();
        self
    }

    /// Set the chunking configuration.
    pub fn with_chunking(mut self, config: ChunkingConfig) -> Self {
        self.chunking = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }

    /// Restrict accepted document names to these extensions.
    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(RetrievalError::Config(
                "dimension must be greater than zero".to_string(),
            ));
        }
        if self.chunking.chunk_size == 0 {
            return Err(RetrievalError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RetrievalError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.query.default_top_k == 0 || self.query.default_top_k > self.query.max_top_k {
            return Err(RetrievalError::Config(format!(
                "default_top_k must be within 1..={}",
                self.query.max_top_k
            )));
        }
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(
            dirs::data_dir()
                .unwrap_or_default()
                .join("docqa")
                .join("rag_state"),
        )
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings.
    pub model: Option<String>,

    /// Override for the provider base URL.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Ollama,
            model: None,
            base_url: None,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Local Ollama server.
    Ollama,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}

/// Configuration for answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model name passed to the generation backend.
    pub model: String,

    /// Override for the backend base URL.
    pub base_url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "llama2".to_string(),
            base_url: None,
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of fragments retrieved when the caller does not say.
    pub default_top_k: usize,

    /// Largest `top_k` a caller may request.
    pub max_top_k: usize,

    /// Longest accepted query, in characters.
    pub max_query_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_top_k: 3,
            max_top_k: 10,
            max_query_chars: 1000,
        }
    }
}

/// Configuration for fixed-window chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in characters.
    pub chunk_size: usize,

    /// Characters shared between consecutive windows.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}
