//! Clustered (inverted-file) index.
//!
//! Rows are partitioned by their nearest centroid. A query ranks the
//! centroids and scans only the `nprobe` best inverted lists.

use super::kmeans::{nearest_centroid, spherical_kmeans};
use super::{inner_product, select_top, FlatIndex, Neighbor, VectorIndex};
use marquee_core::{AppError, AppResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfIndex {
    dimension: usize,
    nprobe: usize,
    /// Row-major unit centroids, `clusters * dimension` values
    centroids: Vec<f32>,
    /// Row ids per centroid
    lists: Vec<Vec<u32>>,
    vectors: FlatIndex,
}

impl IvfIndex {
    /// Train centroids on `rows` and add every row.
    ///
    /// `rows` must be unit length, of equal dimension, and at least
    /// `clusters` long.
    pub fn train(
        rows: &[Vec<f32>],
        clusters: usize,
        nprobe: usize,
        seed: Option<u64>,
    ) -> AppResult<Self> {
        let dimension = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| AppError::Index("Cannot train an index without vectors".to_string()))?;
        if rows.len() > u32::MAX as usize {
            return Err(AppError::Index(format!(
                "Too many vectors for one index: {}",
                rows.len()
            )));
        }

        let trained = spherical_kmeans(rows, clusters, seed)?;

        // Final assignment against the trained centroids
        let assignments: Vec<usize> = rows
            .par_iter()
            .map(|row| nearest_centroid(row, &trained.centroids))
            .collect();

        let mut lists = vec![Vec::new(); clusters];
        for (row, &cluster) in assignments.iter().enumerate() {
            lists[cluster].push(row as u32);
        }

        Ok(Self {
            dimension,
            nprobe: nprobe.max(1),
            centroids: trained.centroids.concat(),
            lists,
            vectors: FlatIndex::from_rows(dimension, rows),
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.lists.len()
    }

    /// Lists scanned per query, never more than there are clusters.
    pub fn nprobe(&self) -> usize {
        self.nprobe.clamp(1, self.cluster_count().max(1))
    }

    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe.max(1);
        self
    }

    /// Sizes of the inverted lists.
    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(Vec::len).collect()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        self.vectors.validate()?;

        if self.vectors.dimension() != self.dimension {
            return Err(format!(
                "stored vectors have dimension {}, index declares {}",
                self.vectors.dimension(),
                self.dimension
            ));
        }
        if self.lists.is_empty() {
            return Err("clustered index has no clusters".to_string());
        }
        if self.centroids.len() != self.lists.len() * self.dimension {
            return Err(format!(
                "{} centroid values do not match {} clusters of dimension {}",
                self.centroids.len(),
                self.lists.len(),
                self.dimension
            ));
        }

        if self.centroids.iter().any(|v| !v.is_finite()) {
            return Err("centroids hold a non-finite value".to_string());
        }

        let rows = self.vectors.len();
        let mut seen = vec![false; rows];
        for &row in self.lists.iter().flatten() {
            let row = row as usize;
            match seen.get_mut(row) {
                None => return Err(format!("inverted list references row {} of {}", row, rows)),
                Some(true) => return Err(format!("row {} appears in more than one list", row)),
                Some(flag) => *flag = true,
            }
        }
        if let Some(missing) = seen.iter().position(|&s| !s) {
            return Err(format!("row {} is not in any inverted list", missing));
        }

        Ok(())
    }
}

impl VectorIndex for IvfIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<Neighbor> {
        if top_k == 0 || self.dimension == 0 {
            return Vec::new();
        }

        let centroid_scores = self
            .centroids
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(cluster, centroid)| Neighbor {
                row: cluster,
                score: inner_product(query, centroid),
            })
            .collect();
        let nearest = select_top(centroid_scores, self.nprobe());

        let candidates = nearest
            .iter()
            .filter_map(|cluster| self.lists.get(cluster.row))
            .flatten()
            .filter_map(|&row| {
                let row = row as usize;
                self.vectors.row(row).map(|vector| Neighbor {
                    row,
                    score: inner_product(query, vector),
                })
            })
            .collect();

        select_top(candidates, top_k)
    }
}
