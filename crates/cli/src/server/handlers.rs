//! Route handlers.

use super::{ApiError, BuildResponse, ServiceState};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use marquee_index::{QueryResult, SearchOptions};
use marquee_llm::{LlmClient, LlmRoute};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

/// `POST /search`
pub async fn search(
    State(state): State<Arc<ServiceState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Vec<QueryResult>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("No query provided"))?;

    let snapshot = state
        .snapshots
        .current()
        .ok_or_else(|| ApiError::internal("No index loaded; run a build first"))?;
    let corpus = state
        .corpus
        .current()
        .ok_or_else(|| ApiError::internal("No corpus loaded"))?;

    let options = SearchOptions::new()
        .with_top_k(request.top_k.unwrap_or(state.default_top_k))
        .with_min_similarity(request.min_similarity.unwrap_or(state.min_similarity));

    tracing::debug!(query, top_k = options.top_k, "Handling search");

    let results =
        marquee_index::search(state.provider.as_ref(), &snapshot, &corpus, query, &options)
            .await?;

    Ok(Json(results))
}

/// `POST /build`
pub async fn build(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<BuildResponse>, ApiError> {
    let Some(permit) = state.build_lock.try_acquire_owned() else {
        return Err(ApiError::conflict("build already in progress"));
    };

    // The build finishes and publishes even if the client goes away
    let task = tokio::spawn(async move {
        let _permit = permit;
        state.rebuild().await
    });

    let response = task
        .await
        .map_err(|e| ApiError::internal(format!("Build task failed: {}", e)))??;
    Ok(Json(response))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<ServiceState>>) -> Json<Value> {
    let snapshot = state.snapshots.current();
    Json(json!({
        "status": "ok",
        "building": state.build_lock.is_busy(),
        "snapshot": snapshot.as_ref().map(|s| s.manifest()),
    }))
}

/// `POST /completion`
pub async fn completion(
    State(client): State<Arc<LlmClient>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    relay(client.as_ref(), LlmRoute::Completion, payload).await
}

/// `POST /chat`
pub async fn chat(
    State(client): State<Arc<LlmClient>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    relay(client.as_ref(), LlmRoute::Chat, payload).await
}

async fn relay(
    client: &LlmClient,
    route: LlmRoute,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let reply = client.forward(route, &body).await?;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);

    Ok((status, Json(reply.body)).into_response())
}
