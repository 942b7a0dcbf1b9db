//! Embedding client.
//!
//! Provider-agnostic embedding generation with per-item failure isolation.

pub mod provider;
pub mod providers;

pub use provider::{check_vector, create_provider, EmbeddingProvider};

use crate::progress::ProgressReporter;
use tracing::{info, warn};

/// Outcome counts of a full embedding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmbeddingSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Dimension shared by every successful vector
    pub dimension: Option<usize>,
}

/// Drives a provider over a whole corpus in batches.
pub struct BatchEmbedder<'a> {
    provider: &'a dyn EmbeddingProvider,
    concurrency: usize,
    batch_size: usize,
}

impl<'a> BatchEmbedder<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, concurrency: usize, batch_size: usize) -> Self {
        Self {
            provider,
            concurrency: concurrency.max(1),
            batch_size: batch_size.max(1),
        }
    }

    /// Embed every text. The result is aligned with `texts`.
    ///
    /// The first successful vector in input order fixes the dimension;
    /// vectors of any other size are counted as failures.
    pub async fn embed_all(
        &self,
        texts: &[String],
        progress: &ProgressReporter,
    ) -> (Vec<Option<Vec<f32>>>, EmbeddingSummary) {
        info!(
            "Embedding {} texts using provider '{}' (model: {})",
            texts.len(),
            self.provider.provider_name(),
            self.provider.model_name()
        );

        let total = texts.len() as u64;
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embedded = self.provider.embed_batch(batch, self.concurrency).await;
            vectors.extend(embedded);
            progress.embed(vectors.len() as u64, Some(total), self.provider.model_name());
        }

        let mut dimension = None;
        for (position, slot) in vectors.iter_mut().enumerate() {
            let Some(vector) = slot else { continue };
            match dimension {
                None => dimension = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    warn!(
                        position,
                        expected,
                        actual = vector.len(),
                        "Embedding has unexpected dimension; skipping item"
                    );
                    *slot = None;
                }
                Some(_) => {}
            }
        }

        let succeeded = vectors.iter().filter(|v| v.is_some()).count();
        let summary = EmbeddingSummary {
            succeeded,
            failed: vectors.len() - succeeded,
            dimension,
        };

        if summary.failed > 0 {
            warn!(
                "{} of {} texts could not be embedded and were skipped",
                summary.failed,
                texts.len()
            );
        }

        (vectors, summary)
    }
}
