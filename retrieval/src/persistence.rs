//! Persistence of the engine state as a pair of companion files.
//!
//! A base path `P` owns:
//!
//! - `P.<generation>.index.json`: the embedding dimension and the vectors, in position order
//! - `P.<generation>.fragments.json`: fragment texts and metadata, in the same order
//! - `P.manifest.json`: names the generation whose pair is current
//!
//! A save writes a fresh pair under a new generation, then publishes it by
//! renaming the manifest into place. That rename is the only step that
//! changes what [`PersistenceManager::load`] sees, so an interrupted save
//! leaves the previous pair current. Pairs no manifest points at are removed
//! after the next successful save.

use std::borrow::Cow;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docqa_embeddings::{Embedding, VectorIndex};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, RetrievalError};
use crate::fragment::{Fragment, FragmentStore};

/// Engine contents as read from or written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    /// Dimension of every vector.
    pub dimension: usize,

    /// Fragments in position order.
    pub fragments: Vec<Fragment>,

    /// Vectors in position order; `vectors[i]` belongs to `fragments[i]`.
    pub vectors: Vec<Embedding>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    generation: String,
    count: usize,
    dimension: usize,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexArtifact<'a> {
    version: u32,
    generation: String,
    dimension: usize,
    vectors: Cow<'a, [Embedding]>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FragmentArtifact<'a> {
    version: u32,
    generation: String,
    count: usize,
    fragments: Cow<'a, [Fragment]>,
}

const CURRENT_VERSION: u32 = 1;
const INDEX_SUFFIX: &str = ".index.json";
const FRAGMENTS_SUFFIX: &str = ".fragments.json";

/// Reads and writes [`PersistedState`] under one base path.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    base_path: PathBuf,
}

impl PersistenceManager {
    /// Create a manager for the artifacts sharing `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// The base path every artifact derives from.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the manifest naming the current generation.
    pub fn manifest_path(&self) -> PathBuf {
        with_suffix(&self.base_path, ".manifest.json")
    }

    /// Path of the vector artifact for `generation`.
    pub fn index_path(&self, generation: &str) -> PathBuf {
        with_suffix(&self.base_path, &format!(".{generation}{INDEX_SUFFIX}"))
    }

    /// Path of the fragment artifact for `generation`.
    pub fn fragments_path(&self, generation: &str) -> PathBuf {
        with_suffix(&self.base_path, &format!(".{generation}{FRAGMENTS_SUFFIX}"))
    }

    /// Write the index and store to disk.
    ///
    /// The new pair only becomes current when the manifest rename succeeds.
    /// A save that fails or is dropped before that point leaves the previously
    /// saved state as the one [`PersistenceManager::load`] returns.
    pub async fn save(&self, index: &VectorIndex, store: &FragmentStore) -> Result<()> {
        let generation = self.stage(index, store).await?;

        if let Err(e) = fs::rename(self.staged_manifest_path(), self.manifest_path()).await {
            self.discard(&generation).await;
            return Err(e.into());
        }

        self.sweep(&generation).await;
        info!(
            "Saved {} fragments to {} (generation {generation})",
            store.size(),
            self.base_path.display()
        );
        Ok(())
    }

    /// Write a new generation's artifacts and a staged manifest for it.
    ///
    /// Nothing written here is visible to `load` until the staged manifest is
    /// renamed over the current one.
    async fn stage(&self, index: &VectorIndex, store: &FragmentStore) -> Result<String> {
        if index.size() != store.size() {
            return Err(RetrievalError::CorruptState(format!(
                "refusing to save {} vectors with {} fragments",
                index.size(),
                store.size()
            )));
        }

        fs::create_dir_all(self.parent_dir()).await?;

        let generation = uuid::Uuid::new_v4().to_string();
        let index_json = serde_json::to_vec(&IndexArtifact {
            version: CURRENT_VERSION,
            generation: generation.clone(),
            dimension: index.dimension(),
            vectors: Cow::Borrowed(index.vectors()),
        })?;
        let fragments_json = serde_json::to_vec_pretty(&FragmentArtifact {
            version: CURRENT_VERSION,
            generation: generation.clone(),
            count: store.size(),
            fragments: Cow::Borrowed(store.fragments()),
        })?;
        let manifest_json = serde_json::to_vec_pretty(&Manifest {
            version: CURRENT_VERSION,
            generation: generation.clone(),
            count: store.size(),
            dimension: index.dimension(),
            saved_at: Utc::now(),
        })?;

        let written = match fs::write(self.index_path(&generation), &index_json).await {
            Ok(()) => match fs::write(self.fragments_path(&generation), &fragments_json).await {
                Ok(()) => fs::write(self.staged_manifest_path(), &manifest_json).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.discard(&generation).await;
            return Err(e.into());
        }

        debug!("Staged generation {generation} under {}", self.base_path.display());
        Ok(generation)
    }

    /// Read the current state back.
    ///
    /// Returns `Ok(None)` when nothing has been saved yet, or when the
    /// manifest names a generation whose artifacts are missing. Artifacts
    /// that are present but unreadable or disagree with each other yield
    /// [`RetrievalError::CorruptState`].
    pub async fn load(&self) -> Result<Option<PersistedState>> {
        let manifest_path = self.manifest_path();
        if !fs::try_exists(&manifest_path).await? {
            debug!("No persisted state at {}", self.base_path.display());
            return Ok(None);
        }

        let manifest: Manifest = parse(&manifest_path, &fs::read(&manifest_path).await?)?;
        if manifest.version != CURRENT_VERSION {
            return Err(RetrievalError::CorruptState(format!(
                "unsupported format version {}",
                manifest.version
            )));
        }

        let index_path = self.index_path(&manifest.generation);
        let fragments_path = self.fragments_path(&manifest.generation);
        let index_exists = fs::try_exists(&index_path).await?;
        let fragments_exists = fs::try_exists(&fragments_path).await?;
        if !index_exists || !fragments_exists {
            warn!(
                "Artifacts of generation {} missing under {}, starting empty",
                manifest.generation,
                self.base_path.display()
            );
            return Ok(None);
        }

        let index: IndexArtifact<'static> = parse(&index_path, &fs::read(&index_path).await?)?;
        let fragments: FragmentArtifact<'static> =
            parse(&fragments_path, &fs::read(&fragments_path).await?)?;

        let state = check_consistency(&manifest, index, fragments)?;
        info!(
            "Loaded {} fragments from {} (saved {})",
            state.fragments.len(),
            self.base_path.display(),
            manifest.saved_at
        );
        Ok(Some(state))
    }

    fn staged_manifest_path(&self) -> PathBuf {
        with_suffix(&self.manifest_path(), ".tmp")
    }

    fn parent_dir(&self) -> &Path {
        match self.base_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Remove a generation that never became current.
    async fn discard(&self, generation: &str) {
        remove_quietly(&self.index_path(generation)).await;
        remove_quietly(&self.fragments_path(generation)).await;
        remove_quietly(&self.staged_manifest_path()).await;
    }

    /// Remove artifacts of every generation other than `current`.
    async fn sweep(&self, current: &str) {
        let Some(stem) = self.base_path.file_name().map(|s| s.to_string_lossy().into_owned())
        else {
            return;
        };

        let mut entries = match fs::read_dir(self.parent_dir()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list {}: {e}", self.parent_dir().display());
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list {}: {e}", self.parent_dir().display());
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(generation) = artifact_generation(&name, &stem) {
                if generation != current {
                    debug!("Removing stale generation {generation}");
                    remove_quietly(&entry.path()).await;
                }
            }
        }
    }
}

/// The generation tag of an artifact file named `<stem>.<uuid>.<kind>.json`.
fn artifact_generation<'a>(name: &'a str, stem: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(stem)?.strip_prefix('.')?;
    let generation = rest
        .strip_suffix(INDEX_SUFFIX)
        .or_else(|| rest.strip_suffix(FRAGMENTS_SUFFIX))?;
    uuid::Uuid::parse_str(generation).ok().map(|_| generation)
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw)
        .map_err(|e| RetrievalError::CorruptState(format!("{}: {e}", path.display())))
}

fn check_consistency(
    manifest: &Manifest,
    index: IndexArtifact<'static>,
    fragments: FragmentArtifact<'static>,
) -> Result<PersistedState> {
    if index.version != CURRENT_VERSION || fragments.version != CURRENT_VERSION {
        return Err(RetrievalError::CorruptState(format!(
            "unsupported format version (index {}, fragments {})",
            index.version, fragments.version
        )));
    }
    if index.generation != manifest.generation || fragments.generation != manifest.generation {
        return Err(RetrievalError::CorruptState(
            "index and fragment artifacts come from different saves".to_string(),
        ));
    }
    if fragments.count != fragments.fragments.len() || manifest.count != fragments.count {
        return Err(RetrievalError::CorruptState(format!(
            "manifest declares {} fragments, artifact declares {} and holds {}",
            manifest.count,
            fragments.count,
            fragments.fragments.len()
        )));
    }
    if index.vectors.len() != fragments.fragments.len() {
        return Err(RetrievalError::CorruptState(format!(
            "{} vectors but {} fragments",
            index.vectors.len(),
            fragments.fragments.len()
        )));
    }
    if index.dimension != manifest.dimension {
        return Err(RetrievalError::CorruptState(format!(
            "manifest dimension {} but index dimension {}",
            manifest.dimension, index.dimension
        )));
    }
    if let Some(bad) = index.vectors.iter().find(|v| v.len() != index.dimension) {
        return Err(RetrievalError::CorruptState(format!(
            "vector of dimension {} in an index of dimension {}",
            bad.len(),
            index.dimension
        )));
    }

    Ok(PersistedState {
        dimension: index.dimension,
        fragments: fragments.fragments.into_owned(),
        vectors: index.vectors.into_owned(),
    })
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample(names: &[&str]) -> (VectorIndex, FragmentStore) {
        let mut index = VectorIndex::new(2);
        let mut store = FragmentStore::new();
        for (i, name) in names.iter().enumerate() {
            index.append(vec![i as f32, 1.0]).unwrap();
            store.append(Fragment::new(format!("chunk {i}"), *name));
        }
        (index, store)
    }

    fn current_generation(manager: &PersistenceManager) -> String {
        let raw = std::fs::read(manager.manifest_path()).unwrap();
        let manifest: Manifest = serde_json::from_slice(&raw).unwrap();
        manifest.generation
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_missing_state_loads_none() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        assert!(manager.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("nested/dir/state"));
        let (index, store) = sample(&["a.pdf", "a.pdf", "b.pdf"]);

        manager.save(&index, &store).await.unwrap();
        let state = manager.load().await.unwrap().unwrap();

        assert_eq!(state.dimension, 2);
        assert_eq!(state.fragments, store.fragments().to_vec());
        assert_eq!(state.vectors, index.vectors().to_vec());
    }

    #[tokio::test]
    async fn test_unpublished_generation_keeps_previous_state() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        let (old_index, old_store) = sample(&["a.pdf", "b.pdf"]);
        let (new_index, new_store) = sample(&["c.pdf"]);
        manager.save(&old_index, &old_store).await.unwrap();

        // Both new artifacts are on disk but the manifest was never renamed.
        let staged = manager.stage(&new_index, &new_store).await.unwrap();
        assert!(manager.index_path(&staged).exists());
        assert!(manager.fragments_path(&staged).exists());

        let state = manager.load().await.unwrap().unwrap();
        assert_eq!(state.fragments, old_store.fragments().to_vec());

        // The next save publishes its own pair and clears the leftovers.
        manager.save(&new_index, &new_store).await.unwrap();
        assert!(!manager.index_path(&staged).exists());
        assert_eq!(file_count(temp_dir.path()), 3);
        let state = manager.load().await.unwrap().unwrap();
        assert_eq!(state.fragments, new_store.fragments().to_vec());
    }

    #[tokio::test]
    async fn test_dropped_save_loads_a_whole_state() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        let (old_index, old_store) = sample(&["a.pdf", "b.pdf"]);
        let (new_index, new_store) = sample(&["c.pdf"]);
        manager.save(&old_index, &old_store).await.unwrap();

        let _ = tokio::time::timeout(Duration::ZERO, manager.save(&new_index, &new_store)).await;

        let state = manager.load().await.unwrap().unwrap();
        assert!(
            state.fragments == old_store.fragments() || state.fragments == new_store.fragments()
        );
    }

    #[tokio::test]
    async fn test_old_generation_removed_after_save() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        let (index, store) = sample(&["a.pdf"]);

        manager.save(&index, &store).await.unwrap();
        let first = current_generation(&manager);
        manager.save(&index, &store).await.unwrap();

        assert_ne!(current_generation(&manager), first);
        assert!(!manager.index_path(&first).exists());
        assert!(!manager.fragments_path(&first).exists());
        assert_eq!(file_count(temp_dir.path()), 3);
    }

    #[tokio::test]
    async fn test_missing_artifact_loads_none() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        let (index, store) = sample(&["a.pdf"]);
        manager.save(&index, &store).await.unwrap();

        std::fs::remove_file(manager.index_path(&current_generation(&manager))).unwrap();
        assert!(manager.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mismatched_counts_are_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        let (index, store) = sample(&["a.pdf", "a.pdf", "b.pdf"]);
        manager.save(&index, &store).await.unwrap();

        let index_path = manager.index_path(&current_generation(&manager));
        let raw = std::fs::read_to_string(&index_path).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["vectors"].as_array_mut().unwrap().pop();
        std::fs::write(&index_path, value.to_string()).unwrap();

        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, RetrievalError::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_artifacts_from_different_saves_are_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        let (index, store) = sample(&["a.pdf", "b.pdf"]);

        manager.save(&index, &store).await.unwrap();
        let old_fragments =
            std::fs::read(manager.fragments_path(&current_generation(&manager))).unwrap();
        manager.save(&index, &store).await.unwrap();
        std::fs::write(
            manager.fragments_path(&current_generation(&manager)),
            old_fragments,
        )
        .unwrap();

        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, RetrievalError::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_garbage_manifest_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        std::fs::write(manager.manifest_path(), "not json").unwrap();

        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, RetrievalError::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_save_refuses_misaligned_state() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path().join("state"));
        let (index, mut store) = sample(&["a.pdf"]);
        store.append(Fragment::new("orphan", "c.pdf"));

        assert!(manager.save(&index, &store).await.is_err());
        assert!(!manager.manifest_path().exists());
    }

    #[test]
    fn test_artifact_paths_share_base() {
        let manager = PersistenceManager::new("/data/rag_state");
        assert_eq!(
            manager.manifest_path(),
            PathBuf::from("/data/rag_state.manifest.json")
        );
        assert_eq!(
            manager.index_path("g1"),
            PathBuf::from("/data/rag_state.g1.index.json")
        );
        assert_eq!(
            manager.fragments_path("g1"),
            PathBuf::from("/data/rag_state.g1.fragments.json")
        );
    }

    #[test]
    fn test_artifact_generation_only_matches_own_files() {
        let generation = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(
            artifact_generation(&format!("state.{generation}.index.json"), "state"),
            Some(generation)
        );
        assert_eq!(artifact_generation("state.manifest.json", "state"), None);
        assert_eq!(artifact_generation("state.notes.index.json", "state"), None);
        assert_eq!(
            artifact_generation(&format!("other.{generation}.index.json"), "state"),
            None
        );
    }
}
