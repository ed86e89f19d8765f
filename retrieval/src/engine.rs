//! Retrieval engine: a vector index and a fragment store kept in lockstep.

use std::collections::HashSet;
use std::sync::Arc;

use docqa_embeddings::{Embedding, EmbeddingProvider, VectorIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, RetrievalError};
use crate::fragment::{Fragment, FragmentStore};
use crate::persistence::PersistedState;

/// A fragment returned by a search, with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// ID of the matched fragment.
    pub fragment_id: String,

    /// Document the fragment came from.
    pub document_name: String,

    /// Fragment text.
    pub content: String,

    /// Similarity score in `[0, 1]`; higher is closer.
    pub score: f32,
}

/// Counts describing the engine contents.
///
/// `index_size` always equals `fragment_count`; it is reported separately so
/// callers can observe the alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Number of stored fragments.
    pub fragment_count: usize,

    /// Number of distinct documents.
    pub document_count: usize,

    /// Number of vectors in the index.
    pub index_size: usize,
}

/// The index and store an ingestion would leave behind.
pub(crate) struct PreparedAppend {
    document_name: String,
    pub(crate) index: VectorIndex,
    pub(crate) store: FragmentStore,
    ids: Vec<String>,
}

/// The index and store a document deletion would leave behind.
pub(crate) struct PreparedDelete {
    document_name: String,
    pub(crate) index: VectorIndex,
    pub(crate) store: FragmentStore,
    removed: usize,
}

/// Owns one [`VectorIndex`] and one [`FragmentStore`] and is the only thing
/// allowed to change them.
///
/// Every mutation either applies to both structures or to neither. Fallible
/// work (embedding, dimension checks, building the new index and store)
/// happens on copies, and the final swap contains no `.await`, so dropping a
/// mutation future part-way leaves the engine as it was.
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    index: VectorIndex,
    store: FragmentStore,
}

impl RetrievalEngine {
    /// Create an empty engine for vectors of `dimension` components.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, dimension: usize) -> Self {
        info!(
            "Initializing retrieval engine (provider: {}, dimension: {dimension})",
            embedder.name()
        );
        Self {
            embedder,
            index: VectorIndex::new(dimension),
            store: FragmentStore::new(),
        }
    }

    /// The embedding dimension fixed at construction.
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// The fragment store.
    pub fn store(&self) -> &FragmentStore {
        &self.store
    }

    /// The vector index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Check if the engine holds no fragments.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Embed and store a single fragment, returning its new id.
    pub async fn add_document(&mut self, content: &str, document_name: &str) -> Result<String> {
        let ids = self
            .add_fragments(document_name, vec![content.to_string()])
            .await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| RetrievalError::InvalidInput("nothing was stored".to_string()))
    }

    /// Embed and store several fragments of one document as a single step.
    ///
    /// If embedding any fragment fails, or any vector has the wrong
    /// dimension, nothing is stored.
    pub async fn add_fragments(
        &mut self,
        document_name: &str,
        contents: Vec<String>,
    ) -> Result<Vec<String>> {
        let prepared = self.prepare_append(document_name, contents).await?;
        Ok(self.apply_append(prepared))
    }

    /// Embed `contents` and build the index and store they would produce,
    /// without touching the engine.
    pub(crate) async fn prepare_append(
        &self,
        document_name: &str,
        contents: Vec<String>,
    ) -> Result<PreparedAppend> {
        if document_name.trim().is_empty() {
            return Err(RetrievalError::InvalidInput(
                "document name must not be empty".to_string(),
            ));
        }
        if contents.iter().any(|c| c.trim().is_empty()) {
            return Err(RetrievalError::InvalidInput(
                "fragment content must not be empty".to_string(),
            ));
        }

        let vectors = if contents.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&contents).await?
        };
        if vectors.len() != contents.len() {
            return Err(RetrievalError::Embedding(
                docqa_embeddings::EmbeddingError::BatchSizeMismatch {
                    expected: contents.len(),
                    actual: vectors.len(),
                },
            ));
        }

        // `append_all` validates every vector before it stores any.
        let mut index = self.index.clone();
        index.append_all(vectors)?;

        let mut store = self.store.clone();
        let mut ids = Vec::with_capacity(contents.len());
        for content in contents {
            let fragment = Fragment::new(content, document_name);
            ids.push(fragment.id.clone());
            store.append(fragment);
        }

        Ok(PreparedAppend {
            document_name: document_name.to_string(),
            index,
            store,
            ids,
        })
    }

    /// Swap in a prepared append, returning the new fragment ids.
    pub(crate) fn apply_append(&mut self, prepared: PreparedAppend) -> Vec<String> {
        self.index = prepared.index;
        self.store = prepared.store;
        info!(
            "Added {} fragments from {} (total fragments: {})",
            prepared.ids.len(),
            prepared.document_name,
            self.store.size()
        );
        prepared.ids
    }

    /// Find the `top_k` fragments closest to `query_text`.
    ///
    /// An empty engine yields an empty result without calling the embedder.
    pub async fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(query_text).await?;
        self.search_vector(&query, top_k)
    }

    /// Like [`RetrievalEngine::search`], restricted to the named documents.
    ///
    /// The index has no filter predicate, so this searches over the whole
    /// store and narrows afterwards. With a brute-force index that is exact,
    /// but it costs a full ranking on every call. Fails with
    /// [`RetrievalError::UnknownDocument`] before any search work when a name
    /// is not stored.
    pub async fn search_filtered(
        &self,
        query_text: &str,
        top_k: usize,
        allowed_document_names: &[String],
    ) -> Result<Vec<RetrievalResult>> {
        self.check_known_documents(allowed_document_names)?;

        if self.store.is_empty() || allowed_document_names.is_empty() {
            return Ok(Vec::new());
        }

        let allowed: HashSet<&str> = allowed_document_names.iter().map(String::as_str).collect();
        let query = self.embedder.embed(query_text).await?;
        let broadened = self.search_vector(&query, self.store.size().max(top_k))?;

        let results: Vec<RetrievalResult> = broadened
            .into_iter()
            .filter(|r| allowed.contains(r.document_name.as_str()))
            .take(top_k)
            .collect();

        debug!(
            "Filtered search kept {} results across {} documents",
            results.len(),
            allowed.len()
        );
        Ok(results)
    }

    /// Fail with `UnknownDocument` listing every name that is not stored.
    pub fn check_known_documents(&self, names: &[String]) -> Result<()> {
        let known = self.store.filenames();
        let mut unknown: Vec<String> = names
            .iter()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();
        unknown.dedup();
        Err(RetrievalError::UnknownDocument(unknown))
    }

    fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievalResult>> {
        let neighbors = self.index.search(query, top_k)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let fragment = self.store.get(neighbor.position).ok_or_else(|| {
                RetrievalError::CorruptState(format!(
                    "index position {} has no fragment",
                    neighbor.position
                ))
            })?;
            results.push(RetrievalResult {
                fragment_id: fragment.id.clone(),
                document_name: fragment.document_name.clone(),
                content: fragment.content.clone(),
                score: neighbor.score,
            });
        }
        Ok(results)
    }

    /// Remove every fragment of a document and rebuild the index.
    ///
    /// Surviving vectors are reused rather than re-embedded. Returns the
    /// number of fragments removed.
    pub fn delete_document(&mut self, document_name: &str) -> Result<usize> {
        let prepared = self.prepare_delete(document_name)?;
        Ok(self.apply_delete(prepared))
    }

    /// Build the post-deletion index and store without touching the engine.
    pub(crate) fn prepare_delete(&self, document_name: &str) -> Result<PreparedDelete> {
        let removed = self.store.fragments_for(document_name).len();
        if removed == 0 {
            return Err(RetrievalError::NotFound(format!(
                "document not found: {document_name}"
            )));
        }

        let store = self
            .store
            .remove_where(|f| f.document_name == document_name);
        let vectors: Vec<Embedding> = self
            .index
            .vectors()
            .iter()
            .zip(self.store.iter())
            .filter(|(_, f)| f.document_name != document_name)
            .map(|(v, _)| v.clone())
            .collect();
        let index = VectorIndex::from_vectors(self.index.dimension(), vectors)?;

        if index.size() != store.size() {
            return Err(RetrievalError::CorruptState(format!(
                "rebuild produced {} vectors for {} fragments",
                index.size(),
                store.size()
            )));
        }

        Ok(PreparedDelete {
            document_name: document_name.to_string(),
            index,
            store,
            removed,
        })
    }

    /// Swap in a prepared deletion. Infallible, so it cannot stop half-way.
    pub(crate) fn apply_delete(&mut self, prepared: PreparedDelete) -> usize {
        self.index = prepared.index;
        self.store = prepared.store;
        info!(
            "Deleted {} fragments of {} ({} remain)",
            prepared.removed,
            prepared.document_name,
            self.store.size()
        );
        prepared.removed
    }

    /// Remove everything; the dimension is unchanged.
    pub fn clear(&mut self) {
        self.index.clear();
        self.store.clear();
        info!("Cleared retrieval engine");
    }

    /// Current counts.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            fragment_count: self.store.size(),
            document_count: self.store.filenames().len(),
            index_size: self.index.size(),
        }
    }

    /// Copy the engine contents into a persistable value.
    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            dimension: self.index.dimension(),
            fragments: self.store.fragments().to_vec(),
            vectors: self.index.vectors().to_vec(),
        }
    }

    /// Replace the engine contents with a previously persisted state.
    pub fn restore(&mut self, state: PersistedState) -> Result<()> {
        if state.dimension != self.index.dimension() {
            return Err(RetrievalError::CorruptState(format!(
                "persisted dimension {} does not match engine dimension {}",
                state.dimension,
                self.index.dimension()
            )));
        }
        if state.fragments.len() != state.vectors.len() {
            return Err(RetrievalError::CorruptState(format!(
                "{} fragments but {} vectors",
                state.fragments.len(),
                state.vectors.len()
            )));
        }

        let index = VectorIndex::from_vectors(state.dimension, state.vectors)
            .map_err(|e| RetrievalError::CorruptState(e.to_string()))?;
        self.index = index;
        self.store = FragmentStore::from_fragments(state.fragments);
        info!("Restored {} fragments", self.store.size());
        Ok(())
    }
}
