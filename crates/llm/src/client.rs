//! Passthrough client for a llama.cpp HTTP server.
//!
//! Requests are forwarded as opaque JSON: the service never interprets
//! prompts or generations, it only relays them.

use marquee_core::{AppError, AppResult};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Which upstream operation a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmRoute {
    /// Raw prompt completion
    Completion,
    /// Message-based chat
    Chat,
}

impl LlmRoute {
    /// Upstream path serving this route.
    pub fn path(&self) -> &'static str {
        match self {
            LlmRoute::Completion => "/completion",
            LlmRoute::Chat => "/v1/chat/completions",
        }
    }
}

impl fmt::Display for LlmRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmRoute::Completion => f.write_str("completion"),
            LlmRoute::Chat => f.write_str("chat"),
        }
    }
}

/// Upstream reply, relayed to the caller as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxiedResponse {
    pub status: u16,
    /// JSON body, or the raw text wrapped in a JSON string
    pub body: Value,
}

/// Text-generation upstream client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    base_url: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout.max(Duration::from_secs(1)))
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward a JSON request body and return the upstream reply.
    ///
    /// Non-2xx replies are returned, not raised; only transport failures
    /// are errors. Streaming is switched off so the reply is one document.
    pub async fn forward(&self, route: LlmRoute, body: &Value) -> AppResult<ProxiedResponse> {
        let url = format!("{}{}", self.base_url, route.path());
        tracing::info!("Forwarding {} request to {}", route, url);

        let response = self
            .client
            .post(&url)
            .json(&without_streaming(body))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to read upstream reply: {}", e)))?;

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if status >= 400 {
            tracing::warn!(status, "Upstream returned an error status");
        }

        Ok(ProxiedResponse { status, body })
    }
}

fn without_streaming(body: &Value) -> Value {
    let mut body = body.clone();
    if let Value::Object(map) = &mut body {
        map.insert("stream".to_string(), Value::Bool(false));
    }
    body
}
