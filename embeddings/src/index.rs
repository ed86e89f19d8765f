//! Positional vector index for exact nearest-neighbour search.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{distance_to_similarity, nearest_k, squared_l2};

/// A search hit from the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Position of the matched vector in the index.
    pub position: usize,

    /// Squared euclidean distance to the query.
    pub distance: f32,

    /// Similarity score in `[0, 1]`, derived from `distance`.
    pub score: f32,
}

/// A brute-force index over fixed-dimension vectors.
///
/// Vectors are addressed by insertion position. There is no removal by
/// position: callers that need to drop entries build the surviving set and
/// call [`VectorIndex::rebuild`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Expected dimension of every stored vector.
    dimension: usize,

    /// Stored vectors, in insertion order.
    vectors: Vec<Embedding>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Build an index from an existing vector set.
    pub fn from_vectors(dimension: usize, vectors: Vec<Embedding>) -> Result<Self> {
        let mut index = Self::new(dimension);
        index.rebuild(vectors)?;
        Ok(index)
    }

    /// The dimension fixed at construction.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn size(&self) -> usize {
        self.vectors.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The vector stored at `position`.
    pub fn get(&self, position: usize) -> Option<&Embedding> {
        self.vectors.get(position)
    }

    /// All stored vectors, in position order.
    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }

    /// Check that `vector` has the index dimension and only finite components.
    ///
    /// A NaN or infinite component would make its distances unordered, so
    /// such vectors are neither stored nor searched with.
    pub fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if let Some(component) = vector.iter().position(|x| !x.is_finite()) {
            return Err(EmbeddingError::NonFiniteComponent { component });
        }
        Ok(())
    }

    /// Append a vector at the next position.
    pub fn append(&mut self, vector: Embedding) -> Result<usize> {
        self.check_vector(&vector)?;
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    /// Append several vectors, all or nothing.
    pub fn append_all(&mut self, vectors: Vec<Embedding>) -> Result<()> {
        for vector in &vectors {
            self.check_vector(vector)?;
        }
        self.vectors.extend(vectors);
        Ok(())
    }

    /// Replace the whole contents of the index.
    ///
    /// Every vector is validated before anything is replaced, so a failed
    /// rebuild leaves the previous contents untouched.
    pub fn rebuild(&mut self, vectors: Vec<Embedding>) -> Result<()> {
        for vector in &vectors {
            self.check_vector(vector)?;
        }
        self.vectors = vectors;
        info!("Rebuilt vector index with {} vectors", self.vectors.len());
        Ok(())
    }

    /// Remove every vector; the dimension is kept.
    pub fn clear(&mut self) {
        self.vectors.clear();
    }

    /// Find the `k` nearest vectors to `query`.
    ///
    /// Results are ordered by ascending squared L2 distance, ties resolved
    /// by lower position. `k` is clamped to the index size and an empty
    /// index yields no results.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_vector(query)?;

        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut distances = Vec::with_capacity(self.vectors.len());
        for (position, vector) in self.vectors.iter().enumerate() {
            distances.push((position, squared_l2(query, vector)?));
        }

        let k = k.min(self.vectors.len());
        let neighbors: Vec<Neighbor> = nearest_k(distances, k)
            .into_iter()
            .map(|(position, distance)| Neighbor {
                position,
                distance,
                score: distance_to_similarity(distance),
            })
            .collect();

        debug!(
            "Vector search returned {} of {} entries",
            neighbors.len(),
            self.vectors.len()
        );
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> VectorIndex {
        let mut index = VectorIndex::new(3);
        index.append(vec![1.0, 0.0, 0.0]).unwrap();
        index.append(vec![0.0, 1.0, 0.0]).unwrap();
        index.append(vec![0.9, 0.1, 0.0]).unwrap();
        index
    }

    #[test]
    fn test_append_assigns_positions() {
        let mut index = VectorIndex::new(2);
        assert_eq!(index.append(vec![1.0, 2.0]).unwrap(), 0);
        assert_eq!(index.append(vec![3.0, 4.0]).unwrap(), 1);
        assert_eq!(index.size(), 2);
    }

    #[test]
    fn test_append_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let err = index.append(vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
        assert!(index.is_empty());
    }

    #[test]
    fn test_append_all_is_all_or_nothing() {
        let mut index = VectorIndex::new(2);
        index.append(vec![0.0, 0.0]).unwrap();

        let result = index.append_all(vec![vec![1.0, 1.0], vec![1.0]]);
        assert!(result.is_err());
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_non_finite_vectors_rejected() {
        let mut index = sample();
        let before = index.clone();

        let err = index.append(vec![0.0, f32::NAN, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::NonFiniteComponent { component: 1 }
        ));
        assert!(index.append_all(vec![vec![f32::INFINITY, 0.0, 0.0]]).is_err());
        assert!(index.rebuild(vec![vec![0.0, 0.0, f32::NEG_INFINITY]]).is_err());
        assert!(index.search(&[f32::NAN, 0.0, 0.0], 3).is_err());
        assert_eq!(index, before);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = sample();
        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();

        let positions: Vec<usize> = results.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 2]);
        assert_eq!(results[0].score, 1.0);
        assert!(results[1].score < results[0].score);
    }

    #[test]
    fn test_search_clamps_k() {
        let index = sample();
        let results = index.search(&[0.0, 0.0, 1.0], 50).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_ties_prefer_lower_position() {
        let mut index = VectorIndex::new(1);
        index.append(vec![2.0]).unwrap();
        index.append(vec![-2.0]).unwrap();
        index.append(vec![2.0]).unwrap();

        let positions: Vec<usize> = index
            .search(&[0.0], 3)
            .unwrap()
            .iter()
            .map(|n| n.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_search_empty_index() {
        let index = VectorIndex::new(3);
        assert!(index.search(&[0.0, 0.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_search_query_dimension_mismatch() {
        let index = sample();
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let mut index = sample();
        index.rebuild(vec![vec![0.0, 0.0, 1.0]]).unwrap();

        assert_eq!(index.size(), 1);
        assert_eq!(index.get(0), Some(&vec![0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_contents() {
        let mut index = sample();
        let before = index.clone();

        assert!(index.rebuild(vec![vec![0.0, 0.0, 1.0], vec![0.0]]).is_err());
        assert_eq!(index, before);
    }
}
