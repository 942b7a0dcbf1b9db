//! Vector index structures.
//!
//! Every stored vector is unit length, so inner product equals cosine
//! similarity. Rows are numbered in insertion order and line up with the
//! snapshot's document list.

pub mod flat;
pub mod ivf;
pub mod kmeans;

pub use flat::FlatIndex;
pub use ivf::IvfIndex;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Norms below this are treated as zero.
pub const NORM_EPSILON: f32 = 1e-12;

/// One candidate returned by an index search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub score: f32,
}

/// Read access shared by every index structure.
pub trait VectorIndex {
    /// Dimension of the stored vectors
    fn dimension(&self) -> usize;

    /// Number of stored rows
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `top_k` rows ordered by descending inner product with `query`.
    ///
    /// `query` must already be unit length and of the index dimension.
    fn search(&self, query: &[f32], top_k: usize) -> Vec<Neighbor>;
}

/// Which structure an index uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Flat,
    Ivf,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Flat => f.write_str("flat"),
            IndexKind::Ivf => f.write_str("ivf"),
        }
    }
}

/// The searchable geometry of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexGeometry {
    Flat(FlatIndex),
    Ivf(IvfIndex),
}

impl IndexGeometry {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexGeometry::Flat(_) => IndexKind::Flat,
            IndexGeometry::Ivf(_) => IndexKind::Ivf,
        }
    }

    /// Number of clusters, for clustered indexes.
    pub fn cluster_count(&self) -> Option<usize> {
        match self {
            IndexGeometry::Flat(_) => None,
            IndexGeometry::Ivf(index) => Some(index.cluster_count()),
        }
    }

    /// Structural consistency check, used when loading from disk.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            IndexGeometry::Flat(index) => index.validate(),
            IndexGeometry::Ivf(index) => index.validate(),
        }
    }
}

impl VectorIndex for IndexGeometry {
    fn dimension(&self) -> usize {
        match self {
            IndexGeometry::Flat(index) => index.dimension(),
            IndexGeometry::Ivf(index) => index.dimension(),
        }
    }

    fn len(&self) -> usize {
        match self {
            IndexGeometry::Flat(index) => index.len(),
            IndexGeometry::Ivf(index) => index.len(),
        }
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<Neighbor> {
        match self {
            IndexGeometry::Flat(index) => index.search(query, top_k),
            IndexGeometry::Ivf(index) => index.search(query, top_k),
        }
    }
}

/// Scale `vector` to unit length in place and return its original norm.
///
/// A vector with (near) zero norm is left untouched. Components are
/// scaled by the largest magnitude first, so large finite values cannot
/// overflow the sum of squares.
pub fn l2_normalize(vector: &mut [f32]) -> f32 {
    let scale = vector.iter().fold(0.0f32, |max, x| max.max(x.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }

    let scaled_norm = vector
        .iter()
        .map(|x| {
            let x = x / scale;
            x * x
        })
        .sum::<f32>()
        .sqrt();
    let norm = scale * scaled_norm;

    if norm > NORM_EPSILON {
        for value in vector.iter_mut() {
            *value = (*value / scale) / scaled_norm;
        }
    }
    norm
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Descending by score, ascending by row on ties.
pub(crate) fn rank(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score.total_cmp(&a.score).then(a.row.cmp(&b.row))
}

/// Keep the best `top_k` candidates, sorted.
pub(crate) fn select_top(mut candidates: Vec<Neighbor>, top_k: usize) -> Vec<Neighbor> {
    if top_k == 0 {
        return Vec::new();
    }
    if candidates.len() > top_k {
        candidates.select_nth_unstable_by(top_k - 1, rank);
        candidates.truncate(top_k);
    }
    candidates.sort_unstable_by(rank);
    candidates
}
