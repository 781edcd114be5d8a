//! Vector index trait and the exhaustive flat implementation.
//!
//! [`FlatIndex`] compares the query against every stored vector using
//! squared Euclidean distance. Other nearest-neighbour structures can be
//! slotted in behind [`VectorIndex`] without touching the pipeline.

use std::cmp::Ordering;

use tracing::debug;

use crate::embedding::EmbeddingVector;
use crate::error::{RagError, Result};

/// Convert a squared Euclidean distance into a similarity score.
///
/// For unit-length vectors `distance = 2 - 2 * cos`, so this equals the
/// cosine similarity. For vectors of any other length it is only a
/// monotone proxy and may fall outside `[0, 1]`.
pub fn score_from_distance(distance: f32) -> f32 {
    1.0 - distance / 2.0
}

/// A search hit: a stored vector's position and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion position of the stored vector.
    pub position: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

impl Neighbor {
    /// Similarity score derived from [`distance`](Self::distance).
    pub fn score(&self) -> f32 {
        score_from_distance(self.distance)
    }

    /// Ascending distance, then ascending position.
    fn rank(a: &Self, b: &Self) -> Ordering {
        a.distance.total_cmp(&b.distance).then_with(|| a.position.cmp(&b.position))
    }
}

/// A read-only nearest-neighbour index over embedding vectors.
///
/// Positions are the zero-based insertion order of the vectors the index
/// was built from.
pub trait VectorIndex: Send + Sync {
    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared dimensionality of the stored vectors, or `None` when empty.
    fn dimensions(&self) -> Option<usize>;

    /// Return up to `k` nearest stored vectors, closest first.
    ///
    /// Ties are broken by ascending position. An empty index returns an
    /// empty list for any query.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the query length differs
    /// from the stored dimensionality.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;
}

/// Exhaustive (brute force) vector index.
///
/// Built once from an ordered list of vectors and immutable afterwards.
///
/// # Example
///
/// ```rust
/// use kbase_rag::{EmbeddingVector, FlatIndex, VectorIndex};
///
/// let index = FlatIndex::build(vec![
///     EmbeddingVector::new(vec![0.0, 0.0]),
///     EmbeddingVector::new(vec![1.0, 0.0]),
/// ])
/// .unwrap();
/// let hits = index.search(&[0.9, 0.0], 1).unwrap();
/// assert_eq!(hits[0].position, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dimensions: Option<usize>,
    vectors: Vec<EmbeddingVector>,
}

impl FlatIndex {
    /// Build an index from vectors in insertion order.
    ///
    /// The first vector fixes the dimensionality. An empty input yields a
    /// valid, empty index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if any vector's length
    /// differs from the first one's.
    pub fn build(vectors: Vec<EmbeddingVector>) -> Result<Self> {
        let dimensions = vectors.first().map(EmbeddingVector::dimensions);
        if let Some(expected) = dimensions {
            if let Some(bad) = vectors.iter().find(|v| v.dimensions() != expected) {
                return Err(RagError::DimensionMismatch { expected, actual: bad.dimensions() });
            }
        }
        debug!(count = vectors.len(), dimensions = ?dimensions, "built flat index");
        Ok(Self { dimensions, vectors })
    }

    /// The stored vector at `position`.
    pub fn get(&self, position: usize) -> Option<&EmbeddingVector> {
        self.vectors.get(position)
    }
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(expected) = self.dimensions else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(RagError::DimensionMismatch { expected, actual: query.len() });
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| Neighbor { position, distance: vector.squared_distance(query) })
            .collect();

        if k < neighbors.len() {
            if k == 0 {
                return Ok(Vec::new());
            }
            neighbors.select_nth_unstable_by(k - 1, Neighbor::rank);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(Neighbor::rank);
        Ok(neighbors)
    }
}
