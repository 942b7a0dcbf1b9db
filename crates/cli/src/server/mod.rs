//! HTTP service facade.
//!
//! Search and rebuild share one `ServiceState`. The text-generation proxy
//! routes carry only their LLM client and never see the index.

mod error;
mod handlers;

pub use error::ApiError;

use axum::routing::{get, post};
use axum::Router;
use marquee_core::{config::AppConfig, AppError, AppResult};
use marquee_index::archive::{read_archive, write_archive};
use marquee_index::{
    build_snapshot, create_provider, BuildLock, BuildOptions, BuildStats, Corpus,
    EmbeddingProvider, ProgressReporter, Published, SnapshotStore,
};
use marquee_llm::LlmClient;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by the search, build and health handlers.
pub struct ServiceState {
    pub provider: Arc<dyn EmbeddingProvider>,
    pub snapshots: SnapshotStore,
    pub corpus: Published<Corpus>,
    pub build_lock: Arc<BuildLock>,
    pub build_options: BuildOptions,
    pub corpus_path: PathBuf,
    pub archive_path: PathBuf,
    pub default_top_k: usize,
    pub min_similarity: f32,
}

/// Result of a rebuild triggered over HTTP.
#[derive(Debug, Serialize)]
pub struct BuildResponse {
    #[serde(flatten)]
    pub stats: BuildStats,
    pub archive_bytes: u64,
}

impl ServiceState {
    pub fn from_config(config: &AppConfig, provider: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        Ok(Self {
            provider,
            snapshots: SnapshotStore::default(),
            corpus: Published::default(),
            build_lock: Arc::new(BuildLock::new()),
            build_options: BuildOptions::from_config(config)?,
            corpus_path: config.corpus_path(),
            archive_path: config.archive_path(),
            default_top_k: config.search.server_top_k,
            min_similarity: config.search.min_similarity,
        })
    }

    /// Load whatever archive and corpus exist on disk.
    ///
    /// Failures are logged and leave the service running without them.
    pub fn restore(&self) {
        match read_archive(&self.archive_path) {
            Ok(snapshot) => {
                if snapshot.manifest().model != self.provider.model_name() {
                    warn!(
                        "Archive was built with model {}, queries will use {}",
                        snapshot.manifest().model,
                        self.provider.model_name()
                    );
                }
                self.snapshots.publish(Arc::new(snapshot));
            }
            Err(e) => warn!("No index loaded: {}", e),
        }

        match Corpus::load(&self.corpus_path) {
            Ok(corpus) => {
                self.corpus.publish(Arc::new(corpus));
            }
            Err(e) => warn!("No corpus loaded: {}", e),
        }
    }

    /// Rebuild from the corpus file, persist, then publish.
    ///
    /// Callers must hold the build lock. Dropping this future part way can
    /// leave a new archive on disk that was never published; the HTTP
    /// handler runs it on its own task.
    pub async fn rebuild(&self) -> AppResult<BuildResponse> {
        let corpus_path = self.corpus_path.clone();
        let corpus = tokio::task::spawn_blocking(move || Corpus::load(&corpus_path))
            .await
            .map_err(|e| AppError::Other(format!("Corpus loader failed: {}", e)))??;

        let progress = ProgressReporter::new(Arc::new(|event| {
            tracing::debug!("{}", event.format_simple());
        }));
        let (snapshot, stats) = build_snapshot(
            &corpus,
            self.provider.as_ref(),
            &self.build_options,
            &progress,
        )
        .await?;

        let snapshot = Arc::new(snapshot);
        let archive_path = self.archive_path.clone();
        let to_write = snapshot.clone();
        let archive_bytes = tokio::task::spawn_blocking(move || write_archive(&archive_path, &to_write))
            .await
            .map_err(|e| AppError::Other(format!("Archive writer failed: {}", e)))??;

        self.corpus.publish(Arc::new(corpus));
        self.snapshots.publish(snapshot);
        info!("Published rebuilt index ({} documents)", stats.indexed);

        Ok(BuildResponse {
            stats,
            archive_bytes,
        })
    }
}

/// Assemble the service router.
pub fn router(state: Arc<ServiceState>, llm: Arc<LlmClient>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let search_routes = Router::new()
        .route("/search", post(handlers::search))
        .layer(cors);

    let index_routes = Router::new()
        .merge(search_routes)
        .route("/build", post(handlers::build))
        .route("/health", get(handlers::health))
        .with_state(state);

    let llm_routes = Router::new()
        .route("/completion", post(handlers::completion))
        .route("/chat", post(handlers::chat))
        .with_state(llm);

    index_routes
        .merge(llm_routes)
        .layer(TraceLayer::new_for_http())
}

/// Run the service until Ctrl+C.
pub async fn run(config: &AppConfig, bind: Option<String>) -> AppResult<()> {
    let provider = create_provider(&config.embedding)?;
    let state = Arc::new(ServiceState::from_config(config, provider)?);
    state.restore();

    let llm = Arc::new(LlmClient::new(
        &config.server.llm_endpoint,
        Duration::from_secs(config.server.llm_timeout_secs),
    )?);

    let app = router(state, llm);
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind).await?;

    info!("Listening on http://{}", bind);
    eprintln!("Serving on http://{} (Ctrl+C to stop)", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use marquee_index::embeddings::providers::mock::MockProvider;
    use marquee_index::{Snapshot, SourceRecord};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn records() -> Vec<SourceRecord> {
        vec![
            SourceRecord::new(1)
                .with_title("Orbit")
                .with_overview("Astronauts repair a failing station in orbit.")
                .with_genres(vec![878, 18]),
            SourceRecord::new(2)
                .with_title("Heist")
                .with_overview("Detectives chase a jewel thief through Paris.")
                .with_genres(vec![80]),
            SourceRecord::new(3)
                .with_title("Bistro")
                .with_overview("A chef opens a restaurant in a tiny village.")
                .with_genres(vec![35]),
        ]
    }

    fn write_corpus(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("movies.json");
        let values: Vec<Value> = records()
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect();
        std::fs::write(&path, serde_json::to_string(&values).unwrap()).unwrap();
        path
    }

    fn state(dir: &TempDir) -> ServiceState {
        ServiceState {
            provider: Arc::new(MockProvider::new(64)),
            snapshots: SnapshotStore::default(),
            corpus: Published::default(),
            build_lock: Arc::new(BuildLock::new()),
            build_options: BuildOptions {
                seed: Some(7),
                ..BuildOptions::default()
            },
            corpus_path: write_corpus(dir),
            archive_path: dir.path().join("movies.mrq"),
            default_top_k: 50,
            min_similarity: -1.0,
        }
    }

    async fn loaded_state(dir: &TempDir) -> Arc<ServiceState> {
        let state = state(dir);
        let corpus = Corpus::from_records(records());
        let (snapshot, _): (Snapshot, _) = build_snapshot(
            &corpus,
            state.provider.as_ref(),
            &state.build_options,
            &ProgressReporter::noop(),
        )
        .await
        .unwrap();
        state.snapshots.publish(Arc::new(snapshot));
        state.corpus.publish(Arc::new(corpus));
        Arc::new(state)
    }

    fn llm(base_url: &str) -> Arc<LlmClient> {
        Arc::new(LlmClient::new(base_url, Duration::from_secs(5)).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_search_returns_ranked_records() {
        let dir = TempDir::new().unwrap();
        let app = router(loaded_state(&dir).await, llm("http://127.0.0.1:9"));

        let response = app
            .oneshot(post_json("/search", r#"{"query": "station orbit"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["id"], json!(1));
        assert_eq!(results[0]["title"], json!("Orbit"));
        assert_eq!(
            results[0]["searched_overview"],
            json!("Astronauts repair a failing station in orbit.")
        );
        assert!(results[0]["similarity_score"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_search_honours_top_k() {
        let dir = TempDir::new().unwrap();
        let app = router(loaded_state(&dir).await, llm("http://127.0.0.1:9"));

        let response = app
            .oneshot(post_json("/search", r#"{"query": "chef", "top_k": 1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_rejects_missing_query() {
        let dir = TempDir::new().unwrap();
        let app = router(loaded_state(&dir).await, llm("http://127.0.0.1:9"));

        for body in [r#"{}"#, r#"{"query": ""}"#, r#"{"query": "   "}"#] {
            let response = app.clone().oneshot(post_json("/search", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                body_json(response).await,
                json!({"error": "No query provided"})
            );
        }

        let response = app
            .oneshot(post_json("/search", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_search_without_index_is_server_error() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(state(&dir)), llm("http://127.0.0.1:9"));

        let response = app
            .oneshot(post_json("/search", r#"{"query": "chef"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_search_allows_any_origin() {
        let dir = TempDir::new().unwrap();
        let app = router(loaded_state(&dir).await, llm("http://127.0.0.1:9"));

        let mut request = post_json("/search", r#"{"query": "chef"}"#);
        request
            .headers_mut()
            .insert("origin", "http://example.com".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[tokio::test]
    async fn test_build_publishes_and_persists() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(state(&dir));
        let app = router(state.clone(), llm("http://127.0.0.1:9"));

        let response = app.clone().oneshot(post_json("/build", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["indexed"], json!(3));
        assert_eq!(body["kind"], json!("flat"));
        assert!(body["archive_bytes"].as_u64().unwrap() > 0);

        assert!(state.archive_path.exists());
        assert!(state.snapshots.current().is_some());
        assert!(!state.build_lock.is_busy());

        let response = app
            .oneshot(post_json("/search", r#"{"query": "jewel thief"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await[0]["id"], json!(2));
    }

    #[tokio::test]
    async fn test_abandoned_build_request_still_publishes() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(state(&dir));
        let app = router(state.clone(), llm("http://127.0.0.1:9"));

        // Poll the request once, then drop it like a client hanging up
        let pending = app.oneshot(post_json("/build", ""));
        let _ = tokio::time::timeout(Duration::ZERO, pending).await;

        for _ in 0..500 {
            if state.snapshots.current().is_some() && !state.build_lock.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(state.snapshots.current().is_some());
        assert!(state.corpus.current().is_some());
        assert!(state.archive_path.exists());
        assert!(!state.build_lock.is_busy());
    }

    #[tokio::test]
    async fn test_concurrent_build_conflicts() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(state(&dir));
        let app = router(state.clone(), llm("http://127.0.0.1:9"));

        let _permit = state.build_lock.try_acquire().unwrap();
        let response = app.oneshot(post_json("/build", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await,
            json!({"error": "build already in progress"})
        );
    }

    #[tokio::test]
    async fn test_health_reports_snapshot() {
        let dir = TempDir::new().unwrap();

        let empty = router(Arc::new(state(&dir)), llm("http://127.0.0.1:9"));
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let body = body_json(empty.oneshot(request).await.unwrap()).await;
        assert_eq!(body["status"], json!("ok"));
        assert!(body["snapshot"].is_null());

        let loaded = router(loaded_state(&dir).await, llm("http://127.0.0.1:9"));
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let body = body_json(loaded.oneshot(request).await.unwrap()).await;
        assert_eq!(body["snapshot"]["documents"], json!(3));
        assert_eq!(body["snapshot"]["model"], json!("trigram-v1"));
    }

    #[tokio::test]
    async fn test_completion_relays_upstream_reply() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "Hello"})))
            .mount(&upstream)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"error": "loading model"})),
            )
            .mount(&upstream)
            .await;

        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(state(&dir)), llm(&upstream.uri()));

        let response = app
            .clone()
            .oneshot(post_json("/completion", r#"{"prompt": "Hi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"content": "Hello"}));

        let response = app
            .oneshot(post_json("/chat", r#"{"messages": []}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await, json!({"error": "loading model"}));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_server_error() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(state(&dir)), llm("http://127.0.0.1:9"));

        let response = app
            .oneshot(post_json("/completion", r#"{"prompt": "Hi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
