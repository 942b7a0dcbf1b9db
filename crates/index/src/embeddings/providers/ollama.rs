//! Ollama Embedding Provider
//!
//! Calls a local embedding service speaking Ollama's `/api/embeddings`
//! protocol: `{model, prompt}` in, `{embedding: [f32]}` out.
//!
//! # Example
//! ```no_run
//! use marquee_core::config::EmbeddingSettings;
//! use marquee_index::embeddings::EmbeddingProvider;
//! use marquee_index::embeddings::providers::ollama::OllamaProvider;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let provider = OllamaProvider::new(&EmbeddingSettings::default()).unwrap();
//! let embedding = provider.embed("A heist goes wrong.").await.unwrap();
//! assert_eq!(embedding.len(), 384);
//! # });
//! ```

use crate::embeddings::provider::check_vector;
use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use marquee_core::config::EmbeddingSettings;
use marquee_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Ollama embedding provider using the local HTTP API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// HTTP client for API requests
    client: Client,
    /// Full embeddings URL, e.g. `http://localhost:11434/api/embeddings`
    endpoint: String,
    /// Model name
    model: String,
}

/// Request payload for the embeddings API
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response from the embeddings API
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Error response from the embeddings API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Create a provider from configuration.
    ///
    /// No request is made here; an unreachable service surfaces as
    /// per-item failures when embedding.
    pub fn new(settings: &EmbeddingSettings) -> AppResult<Self> {
        Self::with_endpoint(
            &settings.endpoint,
            &settings.model,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn with_endpoint(endpoint: &str, model: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::Config(format!("Failed to create HTTP client for embeddings: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::EmbeddingFailure(
                "Cannot embed empty text".to_string(),
            ));
        }

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::EmbeddingFailure(format!(
                    "Failed to send request to embedding service: {}",
                    e
                ))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let detail = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);

            return Err(AppError::EmbeddingFailure(format!(
                "Embedding service error ({}): {}",
                status, detail
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingFailure(format!("Failed to parse embedding response: {}", e))
        })?;

        let embedding = body.embedding.ok_or_else(|| {
            AppError::EmbeddingFailure("Response has no 'embedding' field".to_string())
        })?;

        let embedding = check_vector(embedding)?;
        debug!("Generated {} dimensional embedding", embedding.len());

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_for(server: &MockServer) -> OllamaProvider {
        OllamaProvider::with_endpoint(
            &format!("{}/api/embeddings", server.uri()),
            "test-model",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(json!({"model": "test-model", "prompt": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": [0.1, 0.2, 0.3]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let embedding = provider.embed("hello").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "model not loaded"})),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, AppError::EmbeddingFailure(_)));
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_embed_missing_or_empty_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"prompt": "missing"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"prompt": "empty"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"prompt": "zeros"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.0, 0.0]})),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        for prompt in ["missing", "empty", "zeros"] {
            let result = provider.embed(prompt).await;
            assert!(
                matches!(result, Err(AppError::EmbeddingFailure(_))),
                "prompt {} should fail",
                prompt
            );
        }
    }

    #[tokio::test]
    async fn test_embed_empty_text_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [1.0]})))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        assert!(provider.embed("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_embed_batch_partial_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"prompt": "bad"})))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"embedding": [1.0, 0.0]})),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let texts = vec!["good".to_string(), "bad".to_string(), "fine".to_string()];
        let results = provider.embed_batch(&texts, 2).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert!(results[2].is_some());
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let provider = OllamaProvider::with_endpoint(
            "http://127.0.0.1:9/api/embeddings",
            "test-model",
            Duration::from_secs(1),
        )
        .unwrap();

        let result = provider.embed("hello").await;
        assert!(matches!(result, Err(AppError::EmbeddingFailure(_))));
    }
}
