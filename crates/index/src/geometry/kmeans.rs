//! Spherical k-means for training the clustered index.
//!
//! # Algorithm Details
//! - Similarity: inner product over unit vectors (cosine)
//! - Initialization: k-means++ on cosine distance
//! - At most 25 Lloyd iterations, stopping early once assignments settle
//! - Centroids are renormalized after every update
//! - Empty clusters are reseeded from a random training vector
//! - Training uses at most 256 points per centroid

use super::{inner_product, l2_normalize};
use marquee_core::{AppError, AppResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

/// Maximum number of Lloyd iterations.
pub const MAX_ITERATIONS: usize = 25;

/// Training sample cap, per centroid.
pub const MAX_POINTS_PER_CENTROID: usize = 256;

const EPSILON: f32 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Unit-length centroids
    pub centroids: Vec<Vec<f32>>,
    /// Iterations actually run
    pub iterations: usize,
}

/// Cluster unit vectors into `k` groups.
///
/// `vectors` must be non-empty, of equal dimension, and at least `k` long.
/// With a `seed` the result is reproducible.
pub fn spherical_kmeans(
    vectors: &[Vec<f32>],
    k: usize,
    seed: Option<u64>,
) -> AppResult<KMeansResult> {
    if vectors.is_empty() {
        return Err(AppError::Index("Empty vector set provided for clustering".to_string()));
    }
    if k == 0 || k > vectors.len() {
        return Err(AppError::Index(format!(
            "Invalid cluster count {} for {} vectors",
            k,
            vectors.len()
        )));
    }
    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(AppError::Index("Dimension mismatch in training vectors".to_string()));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let sample = training_sample(vectors, k, &mut rng);
    let mut centroids = kmeans_plus_plus(&sample, k, &mut rng);
    let mut assignments = vec![usize::MAX; sample.len()];
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;

        let new_assignments: Vec<usize> = sample
            .par_iter()
            .map(|vector| nearest_centroid(vector, &centroids))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;
        if converged {
            break;
        }

        centroids = update_centroids(&sample, &assignments, k, &mut rng);
    }

    debug!(
        "k-means finished: {} clusters, {} training vectors, {} iterations",
        k,
        sample.len(),
        iterations
    );

    Ok(KMeansResult {
        centroids,
        iterations,
    })
}

/// Index of the centroid with the highest inner product. Ties go to the
/// lowest index.
pub fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best_score = f32::NEG_INFINITY;
    let mut best = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let score = inner_product(vector, centroid);
        if score > best_score {
            best_score = score;
            best = i;
        }
    }

    best
}

fn training_sample<'a>(vectors: &'a [Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<&'a [f32]> {
    let cap = k.saturating_mul(MAX_POINTS_PER_CENTROID);
    if vectors.len() <= cap {
        return vectors.iter().map(Vec::as_slice).collect();
    }

    debug!("Sampling {} of {} vectors for training", cap, vectors.len());
    rand::seq::index::sample(rng, vectors.len(), cap)
        .into_iter()
        .map(|i| vectors[i].as_slice())
        .collect()
}

fn kmeans_plus_plus(vectors: &[&[f32]], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
    centroids.push(vectors[rng.random_range(0..vectors.len())].to_vec());

    // Squared cosine distance to the nearest chosen centroid
    let mut distances: Vec<f32> = vectors
        .iter()
        .map(|v| squared_distance(v, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f32 = distances.iter().sum();

        let next = if total < EPSILON {
            // Every remaining point coincides with a centroid
            rng.random_range(0..vectors.len())
        } else {
            let target = rng.random::<f32>() * total;
            let mut cumulative = 0.0;
            distances
                .iter()
                .position(|&d| {
                    cumulative += d;
                    cumulative >= target
                })
                .unwrap_or(vectors.len() - 1)
        };

        let centroid = vectors[next].to_vec();
        for (distance, vector) in distances.iter_mut().zip(vectors) {
            *distance = distance.min(squared_distance(vector, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    let d = (1.0 - inner_product(a, b)).max(0.0);
    d * d
}

fn update_centroids(
    vectors: &[&[f32]],
    assignments: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut sums = vec![vec![0.0f32; dimension]; k];
    let mut sizes = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments) {
        for (sum, value) in sums[cluster].iter_mut().zip(vector.iter()) {
            *sum += value;
        }
        sizes[cluster] += 1;
    }

    for (centroid, &size) in sums.iter_mut().zip(&sizes) {
        if size == 0 || l2_normalize(centroid) <= EPSILON {
            *centroid = vectors[rng.random_range(0..vectors.len())].to_vec();
        }
    }

    sums
}
