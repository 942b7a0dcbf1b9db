//! Stats command handler.
//!
//! Describes the archive on disk and the corpus it was built from.

use clap::Args;
use marquee_core::{config::AppConfig, AppResult};
use marquee_index::archive::read_archive;
use marquee_index::{ClusterPolicy, Corpus, CorpusStats, IndexGeometry, Snapshot};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Show archive and corpus statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Corpus file to describe
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Archive file to describe
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveReport {
    path: PathBuf,
    bytes: u64,
    model: String,
    dimension: usize,
    kind: String,
    clusters: Option<usize>,
    documents: usize,
    built_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lists: Option<ListReport>,
}

/// Inverted list occupancy.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListReport {
    min: usize,
    max: usize,
    empty: usize,
    mean: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CorpusReport {
    path: PathBuf,
    records: usize,
    distinct_tags: usize,
    distinct_time_buckets: usize,
    target_clusters: usize,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let archive_path = self.archive.clone().unwrap_or_else(|| config.archive_path());
        let corpus_path = self.corpus.clone().unwrap_or_else(|| config.corpus_path());

        // Either side may be missing; report what exists
        let archive = if archive_path.exists() {
            Some(archive_report(&archive_path)?)
        } else {
            None
        };
        let corpus = if corpus_path.exists() {
            let loaded = Corpus::load(&corpus_path)?;
            Some(corpus_report(&corpus_path, &loaded, &ClusterPolicy::from(&config.index)))
        } else {
            None
        };

        if self.json {
            let output = serde_json::json!({
                "archive": archive,
                "corpus": corpus,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        match &archive {
            Some(report) => print_archive(report),
            None => println!("No archive at {}", archive_path.display()),
        }
        println!();
        match &corpus {
            Some(report) => print_corpus(report),
            None => println!("No corpus at {}", corpus_path.display()),
        }

        Ok(())
    }
}

fn archive_report(path: &Path) -> AppResult<ArchiveReport> {
    let bytes = std::fs::metadata(path)?.len();
    let snapshot = read_archive(path)?;
    Ok(describe_snapshot(path, bytes, &snapshot))
}

fn describe_snapshot(path: &Path, bytes: u64, snapshot: &Snapshot) -> ArchiveReport {
    let manifest = snapshot.manifest();
    let lists = match snapshot.index() {
        IndexGeometry::Ivf(index) => list_report(&index.list_sizes()),
        IndexGeometry::Flat(_) => None,
    };

    ArchiveReport {
        path: path.to_path_buf(),
        bytes,
        model: manifest.model.clone(),
        dimension: manifest.dimension,
        kind: manifest.kind.to_string(),
        clusters: manifest.clusters,
        documents: manifest.documents,
        built_at: manifest.built_at.to_rfc3339(),
        lists,
    }
}

fn list_report(sizes: &[usize]) -> Option<ListReport> {
    let min = *sizes.iter().min()?;
    let max = *sizes.iter().max()?;
    let total: usize = sizes.iter().sum();

    Some(ListReport {
        min,
        max,
        empty: sizes.iter().filter(|&&s| s == 0).count(),
        mean: total as f64 / sizes.len() as f64,
    })
}

fn corpus_report(path: &Path, corpus: &Corpus, policy: &ClusterPolicy) -> CorpusReport {
    let stats = CorpusStats::collect(corpus);
    CorpusReport {
        path: path.to_path_buf(),
        records: corpus.len(),
        distinct_tags: stats.distinct_tags,
        distinct_time_buckets: stats.distinct_time_buckets,
        target_clusters: policy.cluster_count(&stats),
    }
}

fn print_archive(report: &ArchiveReport) {
    println!("Archive: {} ({} bytes)", report.path.display(), report.bytes);
    println!("  Model:      {}", report.model);
    println!("  Dimension:  {}", report.dimension);
    println!("  Documents:  {}", report.documents);
    match report.clusters {
        Some(clusters) => println!("  Index:      {} ({} clusters)", report.kind, clusters),
        None => println!("  Index:      {}", report.kind),
    }
    if let Some(lists) = &report.lists {
        println!(
            "  Lists:      min {}, max {}, mean {:.1}, empty {}",
            lists.min, lists.max, lists.mean, lists.empty
        );
    }
    println!("  Built at:   {}", report.built_at);
}

fn print_corpus(report: &CorpusReport) {
    println!("Corpus: {}", report.path.display());
    println!("  Records:         {}", report.records);
    println!("  Distinct genres: {}", report.distinct_tags);
    println!("  Distinct years:  {}", report.distinct_time_buckets);
    println!("  Target clusters: {}", report.target_clusters);
}
