//! Exact index: exhaustive inner-product scan over every row.

use super::{inner_product, select_top, Neighbor, VectorIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    /// Row-major storage, `len * dimension` values
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Build from unit-length rows of equal dimension.
    pub fn from_rows(dimension: usize, rows: &[Vec<f32>]) -> Self {
        let mut index = Self::new(dimension);
        index.vectors.reserve(rows.len() * dimension);
        for row in rows {
            index.add(row);
        }
        index
    }

    pub(crate) fn add(&mut self, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.vectors.extend_from_slice(vector);
    }

    pub(crate) fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.dimension == 0 {
            return Err("index dimension is zero".to_string());
        }
        if self.vectors.len() % self.dimension != 0 {
            return Err(format!(
                "vector storage of {} values is not a multiple of dimension {}",
                self.vectors.len(),
                self.dimension
            ));
        }
        if let Some(position) = self.vectors.iter().position(|v| !v.is_finite()) {
            return Err(format!(
                "row {} holds a non-finite value",
                position / self.dimension
            ));
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<Neighbor> {
        if top_k == 0 || self.dimension == 0 {
            return Vec::new();
        }

        let candidates = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, vector)| Neighbor {
                row,
                score: inner_product(query, vector),
            })
            .collect();

        select_top(candidates, top_k)
    }
}
