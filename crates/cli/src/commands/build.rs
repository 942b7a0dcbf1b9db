//! Build command handler.
//!
//! Runs the full pipeline: load corpus, embed, train, write archive.

use clap::Args;
use marquee_core::{config::AppConfig, AppResult};
use marquee_index::archive::write_archive;
use marquee_index::{build_snapshot, create_provider, BuildOptions, Corpus, ProgressReporter};
use std::path::PathBuf;
use std::sync::Arc;

/// Build the index and write the archive
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Corpus file (JSON array of movie records)
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Archive file to write
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Text to embed per record (overview, composite)
    #[arg(long)]
    pub template: Option<String>,

    /// Fixed k-means seed for reproducible builds
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing build command");

        let corpus_path = self.corpus.clone().unwrap_or_else(|| config.corpus_path());
        let archive_path = self.archive.clone().unwrap_or_else(|| config.archive_path());

        let mut options = BuildOptions::from_config(config)?;
        if let Some(template) = &self.template {
            options.template = template.parse()?;
        }
        if self.seed.is_some() {
            options.seed = self.seed;
        }

        let corpus = Corpus::load(&corpus_path)?;
        let provider = create_provider(&config.embedding)?;

        let progress = if self.json {
            ProgressReporter::noop()
        } else {
            ProgressReporter::new(Arc::new(|event| eprintln!("{}", event.format_simple())))
        };

        let (snapshot, stats) =
            build_snapshot(&corpus, provider.as_ref(), &options, &progress).await?;

        let bytes = write_archive(&archive_path, &snapshot)?;
        progress.save(bytes, &archive_path.display().to_string());

        if self.json {
            let output = serde_json::json!({
                "archive": archive_path,
                "archiveBytes": bytes,
                "records": stats.records,
                "prepared": stats.prepared,
                "indexed": stats.indexed,
                "failed": stats.failed,
                "dimension": stats.dimension,
                "kind": stats.kind.to_string(),
                "clusters": snapshot.manifest().clusters,
                "durationSecs": stats.duration_secs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            let layout = match snapshot.manifest().clusters {
                Some(clusters) => format!("{} index, {} clusters", stats.kind, clusters),
                None => format!("{} index", stats.kind),
            };
            println!(
                "Indexed {} of {} documents ({}, dimension {}) in {:.2}s",
                stats.indexed, stats.prepared, layout, stats.dimension, stats.duration_secs
            );
            if stats.failed > 0 {
                println!("Skipped {} documents that could not be embedded", stats.failed);
            }
            println!("Wrote {} ({} bytes)", archive_path.display(), bytes);
        }

        Ok(())
    }
}
