//! Fragments and the positional fragment store.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The smallest retrievable unit of text, tied to one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Unique identifier, assigned at ingestion and never reused.
    pub id: String,

    /// The text payload.
    pub content: String,

    /// Name of the source document.
    pub document_name: String,

    /// When the fragment was ingested.
    pub created_at: DateTime<Utc>,
}

impl Fragment {
    /// Create a fragment with a fresh identifier.
    pub fn new(content: impl Into<String>, document_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            document_name: document_name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ordered fragment collection, aligned 1:1 with the vector index.
///
/// Position `i` here describes vector `i` in the index. The store only grows
/// at the end; removal produces a new store via [`FragmentStore::remove_where`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentStore {
    fragments: Vec<Fragment>,
}

impl FragmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from fragments already in position order.
    pub fn from_fragments(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    /// Add a fragment at the end.
    pub fn append(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Number of stored fragments.
    pub fn size(&self) -> usize {
        self.fragments.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragment at `position`.
    pub fn get(&self, position: usize) -> Option<&Fragment> {
        self.fragments.get(position)
    }

    /// All fragments, in position order.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Iterate over fragments in position order.
    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter()
    }

    /// Distinct document names, sorted.
    pub fn filenames(&self) -> BTreeSet<&str> {
        self.fragments
            .iter()
            .map(|f| f.document_name.as_str())
            .collect()
    }

    /// Fragments of one document with their positions, in insertion order.
    pub fn fragments_for(&self, document_name: &str) -> Vec<(usize, &Fragment)> {
        self.fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| f.document_name == document_name)
            .collect()
    }

    /// A new store holding only fragments that do not match `predicate`.
    ///
    /// Relative order of the survivors is preserved.
    pub fn remove_where<P>(&self, predicate: P) -> Self
    where
        P: Fn(&Fragment) -> bool,
    {
        Self {
            fragments: self
                .fragments
                .iter()
                .filter(|f| !predicate(f))
                .cloned()
                .collect(),
        }
    }

    /// Remove every fragment.
    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> FragmentStore {
        let mut store = FragmentStore::new();
        store.append(Fragment::new("a1", "a.pdf"));
        store.append(Fragment::new("b1", "b.pdf"));
        store.append(Fragment::new("a2", "a.pdf"));
        store
    }

    #[test]
    fn test_fragment_ids_are_unique() {
        let a = Fragment::new("same", "doc");
        let b = Fragment::new("same", "doc");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_filenames_are_distinct() {
        let store = sample();
        let names: Vec<&str> = store.filenames().into_iter().collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn test_fragments_for_keeps_positions() {
        let store = sample();
        let found: Vec<(usize, &str)> = store
            .fragments_for("a.pdf")
            .into_iter()
            .map(|(i, f)| (i, f.content.as_str()))
            .collect();
        assert_eq!(found, vec![(0, "a1"), (2, "a2")]);
    }

    #[test]
    fn test_remove_where_preserves_order() {
        let mut store = sample();
        store.append(Fragment::new("b2", "b.pdf"));

        let survivors = store.remove_where(|f| f.document_name == "a.pdf");
        let contents: Vec<&str> = survivors.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["b1", "b2"]);
        assert_eq!(store.size(), 4);
    }
}
