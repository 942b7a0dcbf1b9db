//! Embedding provider trait and factory.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use marquee_core::config::EmbeddingSettings;
use marquee_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Embed a single text. One attempt, no retries.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Embed many texts with at most `concurrency` requests in flight.
    ///
    /// Output is aligned with the input: a failed item becomes `None` and
    /// never affects its neighbours.
    async fn embed_batch(&self, texts: &[String], concurrency: usize) -> Vec<Option<Vec<f32>>> {
        let pending: Vec<BoxFuture<'_, Option<Vec<f32>>>> = texts
            .iter()
            .enumerate()
            .map(|(position, text)| embed_item(self, position, text).boxed())
            .collect();

        stream::iter(pending)
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}

/// Embed one batch item, logging and swallowing its failure.
async fn embed_item<P>(provider: &P, position: usize, text: &str) -> Option<Vec<f32>>
where
    P: EmbeddingProvider + ?Sized,
{
    match provider.embed(text).await.and_then(check_vector) {
        Ok(vector) => Some(vector),
        Err(e) => {
            tracing::warn!(
                position,
                preview = %preview(text),
                error = %e,
                "Embedding failed; skipping item"
            );
            None
        }
    }
}

/// Reject vectors that cannot be indexed or normalized.
pub fn check_vector(vector: Vec<f32>) -> AppResult<Vec<f32>> {
    if vector.is_empty() {
        return Err(AppError::EmbeddingFailure("empty embedding".to_string()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(AppError::EmbeddingFailure(
            "embedding contains non-finite values".to_string(),
        ));
    }
    if vector.iter().all(|&v| v == 0.0) {
        return Err(AppError::EmbeddingFailure(
            "embedding is the zero vector".to_string(),
        ));
    }
    Ok(vector)
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 48;
    let mut out: String = text.chars().take(MAX_CHARS).collect();
    if text.chars().nth(MAX_CHARS).is_some() {
        out.push_str("...");
    }
    out
}

/// Create an embedding provider from configuration.
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "mock" => Ok(Arc::new(super::providers::mock::MockProvider::new(
            settings.mock_dimensions,
        ))),

        "ollama" => Ok(Arc::new(super::providers::ollama::OllamaProvider::new(
            settings,
        )?)),

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, mock",
            settings.provider
        ))),
    }
}
