//! Deterministic embedding and generation fakes for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use docqa_embeddings::{Embedding, EmbeddingError, EmbeddingProvider};

use crate::error::{Result, RetrievalError};
use crate::generation::Generator;

/// Embeds text as per-word counts over a fixed vocabulary.
pub(crate) struct KeywordEmbedder {
    vocabulary: Vec<String>,
    fail_on: Option<String>,
}

impl KeywordEmbedder {
    pub(crate) fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| (*w).to_string()).collect(),
            fail_on: None,
        }
    }

    /// Fail any text containing `marker`.
    pub(crate) fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    async fn embed(&self, text: &str) -> docqa_embeddings::Result<Embedding> {
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                return Err(EmbeddingError::ApiRequest(format!("refused: {marker}")));
            }
        }

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        Ok(self
            .vocabulary
            .iter()
            .map(|term| words.iter().filter(|w| **w == term.as_str()).count() as f32)
            .collect())
    }
}

/// Records every prompt and answers with a fixed reply or error.
pub(crate) struct RecordingGenerator {
    reply: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub(crate) fn answering(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(error: &str) -> Self {
        Self {
            reply: Err(error.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, _model: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(RetrievalError::Generation)
    }
}
