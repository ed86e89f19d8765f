//! Shared fakes for the facade integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa_embeddings::{Embedding, EmbeddingError, EmbeddingProvider};
use docqa_retrieval::{
    Chunker, Generator, RetrievalConfig, RetrievalError, RetrievalFacade, Result,
};

pub const VOCABULARY: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Embeds text as per-word counts over [`VOCABULARY`].
pub struct KeywordEmbedder {
    fail_on: Option<String>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self { fail_on: None }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len()
    }

    async fn embed(&self, text: &str) -> docqa_embeddings::Result<Embedding> {
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                return Err(EmbeddingError::ApiRequest(format!("refused: {marker}")));
            }
        }

        let lowered = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|term| {
                lowered
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w == term)
                    .count() as f32
            })
            .collect())
    }
}

/// One fragment per non-blank line.
pub struct LineChunker;

impl Chunker for LineChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Answers with a fixed reply or error and records every prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    error: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn failing(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _model: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.error {
            Some(error) => Err(RetrievalError::Generation(error.clone())),
            None => Ok("generated answer".to_string()),
        }
    }
}

pub fn config(dir: &Path) -> RetrievalConfig {
    RetrievalConfig::new(dir.join("rag_state")).with_dimension(VOCABULARY.len())
}

pub async fn open_with(
    dir: &Path,
    embedder: KeywordEmbedder,
    generator: Arc<ScriptedGenerator>,
) -> RetrievalFacade {
    RetrievalFacade::builder()
        .with_config(config(dir))
        .with_embedder(Arc::new(embedder))
        .with_generator(generator)
        .with_chunker(Box::new(LineChunker))
        .build()
        .await
        .unwrap()
}

pub async fn open(dir: &Path) -> RetrievalFacade {
    open_with(dir, KeywordEmbedder::new(), Arc::new(ScriptedGenerator::default())).await
}

/// Index and store sizes must agree after every operation.
pub async fn assert_aligned(facade: &RetrievalFacade) {
    let stats = facade.stats().await;
    assert_eq!(stats.total_chunks, stats.index_size);
}
