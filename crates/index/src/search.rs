//! Query engine: embed a query, search the snapshot, join live records.

use crate::corpus::Corpus;
use crate::embeddings::EmbeddingProvider;
use crate::geometry::{l2_normalize, VectorIndex, NORM_EPSILON};
use crate::snapshot::Snapshot;
use crate::types::QueryResult;
use marquee_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Per-query knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of results
    pub top_k: usize,
    /// Results scoring below this are dropped
    pub min_similarity: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: -1.0,
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }
}

/// Answer a free-text query against a snapshot.
///
/// Results are sorted by descending similarity. Failures here never touch
/// the snapshot.
#[instrument(skip(provider, snapshot, corpus, query), fields(query_len = query.len(), top_k = options.top_k))]
pub async fn search(
    provider: &dyn EmbeddingProvider,
    snapshot: &Snapshot,
    corpus: &Corpus,
    query: &str,
    options: &SearchOptions,
) -> AppResult<Vec<QueryResult>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidRequest("query must not be empty".to_string()));
    }
    if options.top_k == 0 {
        return Ok(Vec::new());
    }

    let vector = provider
        .embed(query)
        .await
        .map_err(|e| AppError::EmbeddingUnavailable(e.to_string()))?;

    search_vector(snapshot, corpus, vector, options)
}

/// Search with an already-embedded query vector.
pub fn search_vector(
    snapshot: &Snapshot,
    corpus: &Corpus,
    mut vector: Vec<f32>,
    options: &SearchOptions,
) -> AppResult<Vec<QueryResult>> {
    if vector.is_empty() {
        return Err(AppError::EmbeddingUnavailable(
            "embedding service returned an empty vector".to_string(),
        ));
    }
    if vector.len() != snapshot.dimension() {
        return Err(AppError::DimensionMismatch {
            expected: snapshot.dimension(),
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(AppError::EmbeddingUnavailable(
            "query embedding contains non-finite values".to_string(),
        ));
    }
    if l2_normalize(&mut vector) <= NORM_EPSILON {
        return Err(AppError::EmbeddingUnavailable(
            "query embedding has zero norm".to_string(),
        ));
    }

    let neighbors = snapshot.index().search(&vector, options.top_k);
    debug!("Index returned {} candidates", neighbors.len());

    let mut hits = Vec::with_capacity(neighbors.len());
    for neighbor in neighbors {
        if neighbor.score < options.min_similarity {
            continue;
        }

        let Some(document) = snapshot.document(neighbor.row) else {
            warn!(row = neighbor.row, "Index row has no document; skipping");
            continue;
        };

        // Records removed from the live corpus since the build are dropped
        let Some(record) = corpus.get(&document.source_id) else {
            warn!(id = %document.source_id, "Record no longer in corpus; skipping");
            continue;
        };

        hits.push((
            neighbor.row,
            QueryResult {
                record: record.clone(),
                matched_text: document.text.clone(),
                score: neighbor.score,
            },
        ));
    }

    hits.sort_by(|(row_a, a), (row_b, b)| {
        b.score.total_cmp(&a.score).then(row_a.cmp(row_b))
    });

    Ok(hits.into_iter().map(|(_, hit)| hit).collect())
}
