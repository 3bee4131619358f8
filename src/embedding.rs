//! Content embeddings and cosine similarity.
//!
//! Each item may carry a fixed-length vector describing its content. The
//! magnitude is computed once on construction so similarity scoring only
//! needs a dot product per candidate.

use crate::catalog::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Content vector with its precomputed L2 norm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct EmbeddingVector {
    components: Vec<f32>,
    magnitude: f32,
}

impl EmbeddingVector {
    /// Build a vector and precompute its magnitude.
    ///
    /// A vector holding any non-finite component gets a magnitude of zero,
    /// which makes it contribute nothing to similarity scoring.
    #[must_use]
    pub fn new(components: Vec<f32>) -> Self {
        let magnitude = if components.iter().all(|c| c.is_finite()) {
            components.iter().map(|c| c * c).sum::<f32>().sqrt()
        } else {
            0.0
        };

        Self {
            components,
            // sqrt of a sum of squares can still overflow to inf
            magnitude: if magnitude.is_finite() { magnitude } else { 0.0 },
        }
    }

    /// Decode a packed little-endian `f32` blob.
    ///
    /// Trailing bytes that do not form a whole `f32` are ignored.
    #[must_use]
    pub fn from_le_bytes(blob: &[u8]) -> Self {
        let components = blob
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::new(components)
    }

    /// Encode as a packed little-endian `f32` blob.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.components
            .iter()
            .flat_map(|c| c.to_le_bytes())
            .collect()
    }

    #[must_use]
    pub fn components(&self) -> &[f32] {
        &self.components
    }

    #[must_use]
    pub fn magnitude(&self) -> f32 {
        self.magnitude
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Dot product over the shared prefix of both vectors.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        self.components
            .iter()
            .zip(&other.components)
            .map(|(a, b)| a * b)
            .sum()
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(components: Vec<f32>) -> Self {
        Self::new(components)
    }
}

impl From<EmbeddingVector> for Vec<f32> {
    fn from(vector: EmbeddingVector) -> Self {
        vector.components
    }
}

/// Cosine similarity between two embeddings.
///
/// Returns exactly `0.0` when either magnitude is zero or when the vectors
/// have different dimensions.
#[must_use]
pub fn cosine_similarity(a: &EmbeddingVector, b: &EmbeddingVector) -> f64 {
    if a.magnitude <= 0.0 || b.magnitude <= 0.0 || a.len() != b.len() {
        return 0.0;
    }

    let similarity = f64::from(a.dot(b)) / (f64::from(a.magnitude) * f64::from(b.magnitude));
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Read-only lookup of item embeddings.
///
/// Absence is a normal outcome: most catalogs only have vectors for a subset
/// of their items.
pub trait EmbeddingStore {
    fn lookup(&self, item: ItemId) -> Option<&EmbeddingVector>;
}

/// Embedding store backed by a hash map.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMap {
    vectors: HashMap<ItemId, EmbeddingVector>,
}

impl EmbeddingMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: ItemId, vector: EmbeddingVector) {
        self.vectors.insert(item, vector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl FromIterator<(ItemId, EmbeddingVector)> for EmbeddingMap {
    fn from_iter<I: IntoIterator<Item = (ItemId, EmbeddingVector)>>(iter: I) -> Self {
        Self {
            vectors: iter.into_iter().collect(),
        }
    }
}

impl EmbeddingStore for EmbeddingMap {
    fn lookup(&self, item: ItemId) -> Option<&EmbeddingVector> {
        self.vectors.get(&item)
    }
}

/// Store with no vectors at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmbeddings;

impl EmbeddingStore for NoEmbeddings {
    fn lookup(&self, _item: ItemId) -> Option<&EmbeddingVector> {
        None
    }
}
