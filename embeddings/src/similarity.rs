//! Distance and similarity computation for embeddings.

use ordered_float::OrderedFloat;

use crate::error::{EmbeddingError, Result};

/// Compute the squared euclidean distance between two embeddings.
///
/// The square root is skipped: ranking by squared distance is identical to
/// ranking by distance, and the score mapping is defined on the squared value.
pub fn squared_l2(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum())
}

/// Map a non-negative distance to a similarity score in `[0, 1]`.
///
/// Identical vectors score `1.0`; the score decreases monotonically as the
/// distance grows. A NaN distance sorts after every number in [`nearest_k`],
/// so it scores `0.0` like an infinite one.
pub fn distance_to_similarity(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    1.0 / (1.0 + distance.max(0.0))
}

/// Return the `k` closest `(position, distance)` pairs, ascending by distance.
///
/// Ties keep the lower position first. `k` larger than the candidate count
/// returns every candidate.
pub(crate) fn nearest_k(distances: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    let mut ranked = distances;
    ranked.sort_by_key(|&(position, distance)| (OrderedFloat(distance), position));
    ranked.truncate(k);
    ranked
}
