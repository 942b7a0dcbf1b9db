//! Semantic index over movie overviews.
//!
//! Turns a corpus of movie records into a compact similarity index
//! (clustered, or exact for small corpora), persists it as one archive,
//! and answers free-text queries with records ranked by cosine similarity.

pub mod archive;
pub mod capacity;
pub mod corpus;
pub mod embeddings;
pub mod geometry;
pub mod progress;
pub mod search;
pub mod snapshot;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use capacity::ClusterPolicy;
pub use corpus::{prepare_documents, Corpus, CorpusStats, TextTemplate};
pub use embeddings::{create_provider, BatchEmbedder, EmbeddingProvider, EmbeddingSummary};
pub use geometry::{IndexGeometry, IndexKind, VectorIndex};
pub use progress::{ProgressEvent, ProgressReporter};
pub use search::{search, search_vector, SearchOptions};
pub use snapshot::{
    BuildLock, OwnedBuildPermit, Published, Snapshot, SnapshotManifest, SnapshotStore,
};
pub use types::{IndexableDocument, QueryResult, RecordId, SourceRecord};

use chrono::Utc;
use geometry::{l2_normalize, FlatIndex, IvfIndex};
use marquee_core::{AppConfig, AppError, AppResult};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Everything a build needs besides the corpus and the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub policy: ClusterPolicy,
    pub template: TextTemplate,
    /// Inverted lists scanned per query
    pub nprobe: usize,
    /// Fixed k-means seed for reproducible builds
    pub seed: Option<u64>,
    /// Embedding requests in flight
    pub concurrency: usize,
    pub batch_size: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            policy: ClusterPolicy::default(),
            template: TextTemplate::Overview,
            nprobe: 8,
            seed: None,
            concurrency: 8,
            batch_size: 32,
        }
    }
}

impl BuildOptions {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            policy: ClusterPolicy::from(&config.index),
            template: config.index.text_template.parse()?,
            nprobe: config.index.nprobe,
            seed: config.index.seed,
            concurrency: config.embedding.concurrency,
            batch_size: config.embedding.batch_size,
        })
    }
}

/// Statistics about a completed build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildStats {
    /// Records in the corpus
    pub records: usize,
    /// Documents with usable text
    pub prepared: usize,
    /// Documents embedded and indexed
    pub indexed: usize,
    /// Documents skipped because embedding failed
    pub failed: usize,
    pub dimension: usize,
    pub kind: IndexKind,
    /// Cluster count the policy asked for
    pub target_clusters: usize,
    pub duration_secs: f64,
}

/// Build a snapshot from a corpus.
///
/// Documents whose embedding fails are excluded; the build only fails when
/// none succeed.
pub async fn build_snapshot(
    corpus: &Corpus,
    provider: &dyn EmbeddingProvider,
    options: &BuildOptions,
    progress: &ProgressReporter,
) -> AppResult<(Snapshot, BuildStats)> {
    let start = Instant::now();

    info!(
        "Starting index build over {} records (provider: {}, model: {})",
        corpus.len(),
        provider.provider_name(),
        provider.model_name()
    );

    let documents = prepare_documents(corpus, options.template);
    progress.prepare(documents.len() as u64, corpus.len() as u64);

    if documents.is_empty() {
        return Err(AppError::CorpusTooSmall(format!(
            "none of the {} records has an overview to index",
            corpus.len()
        )));
    }

    let stats = CorpusStats::collect(corpus);
    let target_clusters = options.policy.cluster_count(&stats);
    info!(
        "Corpus has {} distinct genres over {} distinct years; targeting {} clusters",
        stats.distinct_tags, stats.distinct_time_buckets, target_clusters
    );

    let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
    let embedder = BatchEmbedder::new(provider, options.concurrency, options.batch_size);
    let (vectors, summary) = embedder.embed_all(&texts, progress).await;

    let dimension = summary.dimension.ok_or_else(|| {
        AppError::CorpusTooSmall(format!(
            "no valid embeddings were generated ({} documents attempted)",
            documents.len()
        ))
    })?;

    let prepared = documents.len();
    let (kept, mut rows): (Vec<IndexableDocument>, Vec<Vec<f32>>) = documents
        .into_iter()
        .zip(vectors)
        .filter_map(|(document, vector)| vector.map(|v| (document, v)))
        .unzip();

    for row in &mut rows {
        l2_normalize(row);
    }

    let index = build_geometry(&rows, dimension, target_clusters, options, progress)?;
    let kind = index.kind();

    let manifest = SnapshotManifest {
        model: provider.model_name().to_string(),
        dimension,
        kind,
        clusters: index.cluster_count(),
        documents: kept.len(),
        built_at: Utc::now(),
    };
    let snapshot = Snapshot::new(manifest, kept, index).map_err(AppError::Index)?;

    let build_stats = BuildStats {
        records: corpus.len(),
        prepared,
        indexed: snapshot.len(),
        failed: summary.failed,
        dimension,
        kind,
        target_clusters,
        duration_secs: start.elapsed().as_secs_f64(),
    };

    info!(
        "Created {} index with {} vectors of dimension {} in {:.2}s ({} skipped)",
        kind,
        build_stats.indexed,
        dimension,
        build_stats.duration_secs,
        build_stats.failed
    );

    Ok((snapshot, build_stats))
}

/// Clustered index when there are enough vectors to train every cluster,
/// exact index otherwise.
fn build_geometry(
    rows: &[Vec<f32>],
    dimension: usize,
    clusters: usize,
    options: &BuildOptions,
    progress: &ProgressReporter,
) -> AppResult<IndexGeometry> {
    let count = rows.len() as u64;

    if rows.len() < clusters {
        info!(
            "Only {} vectors for {} clusters; falling back to an exact index",
            rows.len(),
            clusters
        );
        let index = FlatIndex::from_rows(dimension, rows);
        progress.index(count, Some(count), "flat");
        return Ok(IndexGeometry::Flat(index));
    }

    progress.train(clusters, count);
    let index = IvfIndex::train(rows, clusters, options.nprobe, options.seed)?;
    progress.index(count, Some(count), "ivf");

    Ok(IndexGeometry::Ivf(index))
}
