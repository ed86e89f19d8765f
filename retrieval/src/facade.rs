//! Stable API surface for ingestion, querying and document management.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docqa_embeddings::{EmbeddingProvider, OllamaProvider, OpenAIProvider, VectorIndex};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::chunker::{Chunker, FixedWindowChunker};
use crate::config::{EmbeddingProviderType, RetrievalConfig};
use crate::engine::{EngineStats, RetrievalEngine, RetrievalResult};
use crate::error::{Result, RetrievalError};
use crate::fragment::FragmentStore;
use crate::generation::{Generator, OllamaGenerator};
use crate::persistence::PersistenceManager;
use crate::synthesizer::{Answer, AnswerSynthesizer, Template};

/// What happened to persisted state when the facade was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartupState {
    /// No persisted state existed.
    Fresh,
    /// Persisted state was loaded.
    Restored { fragments: usize },
    /// Persisted state was corrupt and ignored; the engine started empty.
    Discarded { reason: String },
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub filename: String,
    pub chunks_created: usize,
    pub total_chunks: usize,
}

/// Result of deleting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub filename: String,
    pub chunks_removed: usize,
    pub total_chunks: usize,
}

/// Summary of one stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDetails {
    pub filename: String,
    pub chunk_count: usize,
    pub total_chars: usize,
    pub ingested_at: DateTime<Utc>,
}

/// One stored fragment, as shown to callers inspecting a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkView {
    pub id: String,
    pub position: usize,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// System statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub index_size: usize,
}

impl From<EngineStats> for Stats {
    fn from(stats: EngineStats) -> Self {
        Self {
            total_chunks: stats.fragment_count,
            total_documents: stats.document_count,
            index_size: stats.index_size,
        }
    }
}

/// A question to answer from stored documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question.
    pub query: String,

    /// Number of fragments to retrieve; the configured default when absent.
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Template name; unknown names fall back to the default template.
    #[serde(default = "default_template_name")]
    pub template: String,

    /// Restrict retrieval to these documents.
    #[serde(default)]
    pub filenames: Option<Vec<String>>,
}

fn default_template_name() -> String {
    Template::Default.to_string()
}

impl QueryRequest {
    /// Create a request with default settings.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            template: default_template_name(),
            filenames: None,
        }
    }

    /// Set the number of fragments to retrieve.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set the template by name.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Restrict retrieval to the named documents.
    pub fn with_filenames<I, S>(mut self, filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filenames = Some(filenames.into_iter().map(Into::into).collect());
        self
    }
}

/// Composes the engine, persistence and answer synthesis behind one API.
///
/// The engine sits behind a single `RwLock`: ingestion, deletion and clear
/// hold the write guard for their whole duration, including the save, so
/// at most one mutation runs at a time and no read observes one in progress.
/// Every mutation is saved before the engine swaps in its result, so memory
/// never runs ahead of disk.
pub struct RetrievalFacade {
    config: RetrievalConfig,
    engine: RwLock<RetrievalEngine>,
    persistence: PersistenceManager,
    synthesizer: AnswerSynthesizer,
    chunker: Box<dyn Chunker>,
    startup: StartupState,
}

impl RetrievalFacade {
    /// Create a new facade builder.
    pub fn builder() -> RetrievalFacadeBuilder {
        RetrievalFacadeBuilder::new()
    }

    /// Open a facade with collaborators derived from `config`.
    pub async fn open(config: RetrievalConfig) -> Result<Self> {
        RetrievalFacadeBuilder::new().with_config(config).build().await
    }

    /// The configuration in use.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// What happened to persisted state at startup.
    pub fn startup(&self) -> &StartupState {
        &self.startup
    }

    /// Chunk, embed and persist a document, then make it searchable.
    ///
    /// All chunks are stored or none are. The engine only changes once the
    /// new state is on disk.
    pub async fn ingest(&self, content: &str, filename: &str) -> Result<IngestReport> {
        self.validate_filename(filename)?;

        let chunks = self.chunker.chunk(content);
        if chunks.is_empty() {
            return Err(RetrievalError::InvalidInput(format!(
                "no text content in {filename}"
            )));
        }
        let chunks_created = chunks.len();

        let mut engine = self.engine.write().await;
        let prepared = engine.prepare_append(filename, chunks).await?;

        if let Err(e) = self
            .persistence
            .save(&prepared.index, &prepared.store)
            .await
        {
            error!("Failed to persist ingestion of {filename}: {e}");
            return Err(e);
        }

        engine.apply_append(prepared);
        let total_chunks = engine.store().size();
        info!("Ingested {filename}: {chunks_created} chunks ({total_chunks} total)");
        Ok(IngestReport {
            filename: filename.to_string(),
            chunks_created,
            total_chunks,
        })
    }

    /// Retrieve fragments for a request without generating an answer.
    pub async fn retrieve(&self, request: &QueryRequest) -> Result<Vec<RetrievalResult>> {
        let top_k = self.validate_query(request)?;
        let engine = self.engine.read().await;

        if engine.is_empty() {
            return Err(RetrievalError::NotFound(
                "no documents uploaded yet".to_string(),
            ));
        }

        match request.filenames.as_deref() {
            Some(names) if !names.is_empty() => {
                engine.search_filtered(&request.query, top_k, names).await
            }
            _ => engine.search(&request.query, top_k).await,
        }
    }

    /// Answer a question from stored documents.
    ///
    /// Generation failures come back as an [`Answer`] with a
    /// `GenerationFailed` outcome rather than as an error.
    pub async fn query(&self, request: QueryRequest) -> Result<Answer> {
        let results = self.retrieve(&request).await?;
        debug!("Retrieved {} fragments for query", results.len());

        Ok(self
            .synthesizer
            .synthesize(&request.query, &results, &request.template)
            .await)
    }

    /// Distinct document names, sorted.
    pub async fn list_documents(&self) -> Vec<String> {
        let engine = self.engine.read().await;
        engine
            .store()
            .filenames()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Per-document summaries, sorted by name.
    pub async fn document_details(&self) -> Vec<DocumentDetails> {
        let engine = self.engine.read().await;
        let mut details: BTreeMap<&str, DocumentDetails> = BTreeMap::new();

        for fragment in engine.store().iter() {
            let entry = details
                .entry(fragment.document_name.as_str())
                .or_insert_with(|| DocumentDetails {
                    filename: fragment.document_name.clone(),
                    chunk_count: 0,
                    total_chars: 0,
                    ingested_at: fragment.created_at,
                });
            entry.chunk_count += 1;
            entry.total_chars += fragment.content.chars().count();
            entry.ingested_at = entry.ingested_at.min(fragment.created_at);
        }

        details.into_values().collect()
    }

    /// The fragments of one document, in insertion order.
    pub async fn document_chunks(&self, filename: &str) -> Result<Vec<ChunkView>> {
        let engine = self.engine.read().await;
        let chunks: Vec<ChunkView> = engine
            .store()
            .fragments_for(filename)
            .into_iter()
            .map(|(position, fragment)| ChunkView {
                id: fragment.id.clone(),
                position,
                content: fragment.content.clone(),
                created_at: fragment.created_at,
            })
            .collect();

        if chunks.is_empty() {
            return Err(RetrievalError::NotFound(format!(
                "document not found: {filename}"
            )));
        }
        Ok(chunks)
    }

    /// Delete a document and persist the rebuilt state.
    pub async fn delete_document(&self, filename: &str) -> Result<DeleteReport> {
        let mut engine = self.engine.write().await;
        let prepared = engine.prepare_delete(filename)?;

        self.persistence
            .save(&prepared.index, &prepared.store)
            .await?;

        let chunks_removed = engine.apply_delete(prepared);
        Ok(DeleteReport {
            filename: filename.to_string(),
            chunks_removed,
            total_chunks: engine.store().size(),
        })
    }

    /// Remove every document and persist the empty state.
    pub async fn clear(&self) -> Result<()> {
        let mut engine = self.engine.write().await;
        self.persistence
            .save(&VectorIndex::new(engine.dimension()), &FragmentStore::new())
            .await?;
        engine.clear();
        Ok(())
    }

    /// Current statistics.
    pub async fn stats(&self) -> Stats {
        self.engine.read().await.stats().into()
    }

    /// Check if any documents are stored.
    pub async fn has_documents(&self) -> bool {
        !self.engine.read().await.is_empty()
    }

    fn validate_filename(&self, filename: &str) -> Result<()> {
        if filename.trim().is_empty() {
            return Err(RetrievalError::InvalidInput(
                "filename must not be empty".to_string(),
            ));
        }

        if self.config.allowed_extensions.is_empty() {
            return Ok(());
        }

        let extension = Path::new(filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        let allowed = extension.as_deref().is_some_and(|ext| {
            self.config
                .allowed_extensions
                .iter()
                .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext))
        });

        if !allowed {
            return Err(RetrievalError::InvalidInput(format!(
                "only {} files are allowed",
                self.config.allowed_extensions.join(", ")
            )));
        }
        Ok(())
    }

    /// Validate a request and resolve its `top_k`.
    fn validate_query(&self, request: &QueryRequest) -> Result<usize> {
        let limits = &self.config.query;

        if request.query.trim().is_empty() {
            return Err(RetrievalError::InvalidInput("query is required".to_string()));
        }
        let length = request.query.chars().count();
        if length > limits.max_query_chars {
            return Err(RetrievalError::InvalidInput(format!(
                "query is {length} characters, max {}",
                limits.max_query_chars
            )));
        }

        let top_k = request.top_k.unwrap_or(limits.default_top_k);
        if !(1..=limits.max_top_k).contains(&top_k) {
            return Err(RetrievalError::InvalidInput(format!(
                "top_k must be within 1..={}",
                limits.max_top_k
            )));
        }
        Ok(top_k)
    }
}

/// Builder for [`RetrievalFacade`].
pub struct RetrievalFacadeBuilder {
    config: RetrievalConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn Generator>>,
    chunker: Option<Box<dyn Chunker>>,
}

impl RetrievalFacadeBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RetrievalConfig::default(),
            embedder: None,
            generator: None,
            chunker: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific embedding provider instead of the configured one.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use a specific generation backend instead of the configured one.
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use a specific chunker instead of fixed windows.
    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the facade and load any persisted state.
    pub async fn build(self) -> Result<RetrievalFacade> {
        let config = self.config;
        config.validate()?;

        let embedder = self
            .embedder
            .unwrap_or_else(|| configured_embedder(&config));
        if embedder.dimension() != config.dimension {
            return Err(RetrievalError::Config(format!(
                "provider {} produces {} dimensions but the engine is configured for {}",
                embedder.name(),
                embedder.dimension(),
                config.dimension
            )));
        }

        let generator = self
            .generator
            .unwrap_or_else(|| configured_generator(&config));
        let chunker = self
            .chunker
            .unwrap_or_else(|| Box::new(FixedWindowChunker::from(config.chunking)));

        let persistence = PersistenceManager::new(&config.state_path);
        let mut engine = RetrievalEngine::new(embedder, config.dimension);

        let startup = match persistence.load().await {
            Ok(None) => StartupState::Fresh,
            Ok(Some(state)) => match engine.restore(state) {
                Ok(()) => StartupState::Restored {
                    fragments: engine.store().size(),
                },
                Err(e) => discard(&persistence, e),
            },
            Err(e @ RetrievalError::CorruptState(_)) => discard(&persistence, e),
            Err(e) => return Err(e),
        };

        Ok(RetrievalFacade {
            synthesizer: AnswerSynthesizer::new(generator, config.generation.model.clone()),
            config,
            engine: RwLock::new(engine),
            persistence,
            chunker,
            startup,
        })
    }
}

impl Default for RetrievalFacadeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn discard(persistence: &PersistenceManager, err: RetrievalError) -> StartupState {
    warn!(
        "Ignoring persisted state at {}: {err}",
        persistence.base_path().display()
    );
    StartupState::Discarded {
        reason: err.to_string(),
    }
}

fn configured_embedder(config: &RetrievalConfig) -> Arc<dyn EmbeddingProvider> {
    let embedding = &config.embedding;
    match embedding.provider {
        EmbeddingProviderType::Ollama => {
            let mut provider = OllamaProvider::new().with_model(
                embedding.model.as_deref().unwrap_or("all-minilm"),
                config.dimension,
            );
            if let Some(url) = &embedding.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Arc::new(provider)
        }
        EmbeddingProviderType::OpenAI => {
            let mut provider = OpenAIProvider::new();
            if let Some(model) = &embedding.model {
                provider = provider.with_model(model.as_str());
            }
            if let Some(url) = &embedding.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Arc::new(provider)
        }
    }
}

fn configured_generator(config: &RetrievalConfig) -> Arc<dyn Generator> {
    let mut generator = OllamaGenerator::new();
    if let Some(url) = &config.generation.base_url {
        generator = generator.with_base_url(url.as_str());
    }
    Arc::new(generator)
}
