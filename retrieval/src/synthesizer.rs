//! Prompt assembly and answer generation over retrieved fragments.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::engine::RetrievalResult;
use crate::generation::Generator;

/// Answer returned when retrieval found nothing to ground a response in.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in the documents.";

/// Characters of each source kept in the answer payload.
pub const SOURCE_PREVIEW_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

/// How retrieved context and the question are phrased for generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    #[default]
    Default,
    Detailed,
    Concise,
}

impl Template {
    /// Parse a template name, falling back to [`Template::Default`] for
    /// anything unrecognised.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" => Self::Default,
            "detailed" => Self::Detailed,
            "concise" => Self::Concise,
            other => {
                warn!("Unknown template '{other}', using default");
                Self::Default
            }
        }
    }

    /// Fill the template with context and question.
    pub fn render(self, context: &str, question: &str) -> String {
        match self {
            Self::Default => format!(
                "Based on the following context, answer the question.\n\n\
                 Context:\n{context}\n\n\
                 Question: {question}\n\n\
                 Answer:"
            ),
            Self::Detailed => format!(
                "You are a careful assistant. Using only the context below, give a thorough, \
                 well-structured answer. Point out which parts of the context support each \
                 statement. If the context does not contain the answer, say so.\n\n\
                 Context:\n{context}\n\n\
                 Question: {question}\n\n\
                 Detailed answer:"
            ),
            Self::Concise => format!(
                "Answer the question in one or two sentences using only the context below.\n\n\
                 Context:\n{context}\n\n\
                 Question: {question}\n\n\
                 Short answer:"
            ),
        }
    }
}

impl From<&str> for Template {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Detailed => write!(f, "detailed"),
            Self::Concise => write!(f, "concise"),
        }
    }
}

/// How an answer was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The generation backend produced the answer.
    Generated,
    /// No fragments were retrieved; generation was skipped.
    NoContext,
    /// The generation backend failed; `answer` describes the error.
    GenerationFailed { error: String },
}

/// Answer payload returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Generated text, the no-context sentinel, or an error description.
    pub answer: String,

    /// Previews of the fragments used as context, in rank order.
    pub sources: Vec<String>,

    /// Number of fragments used as context.
    pub num_sources: usize,

    /// How `answer` was produced.
    pub outcome: AnswerOutcome,
}

impl Answer {
    /// Check if the answer came from the generation backend.
    pub fn is_generated(&self) -> bool {
        matches!(self.outcome, AnswerOutcome::Generated)
    }
}

/// Builds prompts from retrieved fragments and calls the generation backend.
///
/// Generation failures are not errors here: they come back as an [`Answer`]
/// whose outcome is [`AnswerOutcome::GenerationFailed`].
pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    model: String,
}

impl AnswerSynthesizer {
    /// Create a synthesizer that generates with `model`.
    pub fn new(generator: Arc<dyn Generator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    /// The model name passed to the backend.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer `query_text` from `results` using the named template.
    pub async fn synthesize(
        &self,
        query_text: &str,
        results: &[RetrievalResult],
        template_kind: &str,
    ) -> Answer {
        self.synthesize_with(query_text, results, Template::from_name(template_kind))
            .await
    }

    /// Answer `query_text` from `results` using `template`.
    pub async fn synthesize_with(
        &self,
        query_text: &str,
        results: &[RetrievalResult],
        template: Template,
    ) -> Answer {
        if results.is_empty() {
            return Answer {
                answer: NO_RELEVANT_INFORMATION.to_string(),
                sources: Vec::new(),
                num_sources: 0,
                outcome: AnswerOutcome::NoContext,
            };
        }

        let context = results
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = template.render(&context, query_text);
        debug!(
            "Synthesizing answer from {} fragments with {template} template",
            results.len()
        );

        let (answer, outcome) = match self.generator.generate(&self.model, &prompt).await {
            Ok(text) => (text, AnswerOutcome::Generated),
            Err(e) => {
                error!("Generation with {} failed: {e}", self.generator.name());
                (
                    format!("Error generating answer: {e}"),
                    AnswerOutcome::GenerationFailed {
                        error: e.to_string(),
                    },
                )
            }
        };

        Answer {
            answer,
            sources: results.iter().map(|r| source_preview(&r.content)).collect(),
            num_sources: results.len(),
            outcome,
        }
    }
}

/// First [`SOURCE_PREVIEW_CHARS`] characters of `content`, with an ellipsis
/// when anything was cut.
pub fn source_preview(content: &str) -> String {
    match content.char_indices().nth(SOURCE_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &content[..cut]),
        None => content.to_string(),
    }
}
