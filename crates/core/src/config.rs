//! Configuration management for Marquee.
//!
//! This module handles loading and merging configuration from multiple sources,
//! lowest precedence first:
//! - Built-in defaults
//! - Config file (`.marquee/config.yaml` in the workspace, or an explicit path)
//! - Environment variables
//! - Command-line flags
//!
//! Relative corpus and archive paths are resolved against the workspace.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Embedding providers understood by the index crate.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "mock"];

/// Document text templates understood by the corpus preparer.
pub const KNOWN_TEXT_TEMPLATES: [&str; 2] = ["overview", "composite"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .marquee/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// JSON array of source records
    pub corpus_path: PathBuf,

    /// Compressed index archive
    pub archive_path: PathBuf,

    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub search: SearchSettings,
    pub server: ServerSettings,
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Provider name: "ollama" or "mock"
    pub provider: String,

    /// Full URL of the embeddings endpoint
    pub endpoint: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum in-flight embedding requests during a build
    pub concurrency: usize,

    /// Items per progress batch during a build
    pub batch_size: usize,

    /// Vector size produced by the mock provider
    pub mock_dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434/api/embeddings".to_string(),
            model: "albertogg/multi-qa-minilm-l6-cos-v1:latest".to_string(),
            timeout_secs: 30,
            concurrency: 8,
            batch_size: 32,
            mock_dimensions: 384,
        }
    }
}

/// Index construction settings.
///
/// The cluster constants are empirical; they are exposed here so the
/// heuristic can be tuned per corpus without code changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub tag_weight: usize,
    pub min_base: usize,
    pub max_time_factor: usize,
    pub min_clusters: usize,
    pub max_clusters: usize,

    /// Inverted lists scanned per query
    pub nprobe: usize,

    /// Fixed k-means seed for reproducible training
    pub seed: Option<u64>,

    /// "overview" or "composite"
    pub text_template: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            tag_weight: 2,
            min_base: 10,
            max_time_factor: 5,
            min_clusters: 50,
            max_clusters: 100,
            nprobe: 8,
            seed: None,
            text_template: "overview".to_string(),
        }
    }
}

/// Query defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Results returned by the CLI
    pub top_k: usize,

    /// Results returned by the HTTP service
    pub server_top_k: usize,

    /// Minimum cosine similarity kept in results
    pub min_similarity: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            server_top_k: 50,
            min_similarity: -1.0,
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind: String,

    /// Text-generation upstream base URL
    pub llm_endpoint: String,

    /// Timeout for forwarded text-generation requests
    pub llm_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8081".to_string(),
            llm_endpoint: "http://localhost:8080".to_string(),
            llm_timeout_secs: 120,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    corpus: Option<String>,
    archive: Option<String>,
    embedding: Option<EmbeddingSection>,
    index: Option<IndexSection>,
    search: Option<SearchSection>,
    server: Option<ServerSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingSection {
    provider: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    concurrency: Option<usize>,
    batch_size: Option<usize>,
    mock_dimensions: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexSection {
    tag_weight: Option<usize>,
    min_base: Option<usize>,
    max_time_factor: Option<usize>,
    min_clusters: Option<usize>,
    max_clusters: Option<usize>,
    nprobe: Option<usize>,
    seed: Option<u64>,
    text_template: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSection {
    top_k: Option<usize>,
    server_top_k: Option<usize>,
    min_similarity: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerSection {
    bind: Option<String>,
    llm_endpoint: Option<String>,
    llm_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            corpus_path: PathBuf::from("assets/all_movies.json"),
            archive_path: PathBuf::from("assets/movies_index.mrq"),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            search: SearchSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment, the config file and defaults.
    ///
    /// Environment variables:
    /// - `MARQUEE_WORKSPACE`: Override workspace path
    /// - `MARQUEE_CONFIG`: Path to config file
    /// - `MARQUEE_PROVIDER`: Embedding provider
    /// - `MARQUEE_EMBEDDING_URL`: Embeddings endpoint
    /// - `MARQUEE_MODEL`: Embedding model identifier
    /// - `MARQUEE_CORPUS`: Corpus JSON path
    /// - `MARQUEE_ARCHIVE`: Index archive path
    /// - `MARQUEE_BIND`: Service bind address
    /// - `MARQUEE_LLM_URL`: Text-generation upstream
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use marquee_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Archive: {:?}", config.archive_path());
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Load configuration with explicit workspace / config file paths.
    ///
    /// Explicit arguments win over `MARQUEE_WORKSPACE` and `MARQUEE_CONFIG`.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace.or_else(|| env_path("MARQUEE_WORKSPACE")) {
            config.workspace = workspace;
        }
        config.config_file = config_file.or_else(|| env_path("MARQUEE_CONFIG"));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.marquee_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        config.apply_env();
        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("MARQUEE_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(endpoint) = std::env::var("MARQUEE_EMBEDDING_URL") {
            self.embedding.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("MARQUEE_MODEL") {
            self.embedding.model = model;
        }
        if let Some(corpus) = env_path("MARQUEE_CORPUS") {
            self.corpus_path = corpus;
        }
        if let Some(archive) = env_path("MARQUEE_ARCHIVE") {
            self.archive_path = archive;
        }
        if let Ok(bind) = std::env::var("MARQUEE_BIND") {
            self.server.bind = bind;
        }
        if let Ok(url) = std::env::var("MARQUEE_LLM_URL") {
            self.server.llm_endpoint = url;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }
        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(corpus) = file.corpus {
            result.corpus_path = PathBuf::from(corpus);
        }
        if let Some(archive) = file.archive {
            result.archive_path = PathBuf::from(archive);
        }

        if let Some(e) = file.embedding {
            let target = &mut result.embedding;
            set(&mut target.provider, e.provider);
            set(&mut target.endpoint, e.endpoint);
            set(&mut target.model, e.model);
            set(&mut target.timeout_secs, e.timeout_secs);
            set(&mut target.concurrency, e.concurrency);
            set(&mut target.batch_size, e.batch_size);
            set(&mut target.mock_dimensions, e.mock_dimensions);
        }

        if let Some(i) = file.index {
            let target = &mut result.index;
            set(&mut target.tag_weight, i.tag_weight);
            set(&mut target.min_base, i.min_base);
            set(&mut target.max_time_factor, i.max_time_factor);
            set(&mut target.min_clusters, i.min_clusters);
            set(&mut target.max_clusters, i.max_clusters);
            set(&mut target.nprobe, i.nprobe);
            set(&mut target.text_template, i.text_template);
            if i.seed.is_some() {
                target.seed = i.seed;
            }
        }

        if let Some(s) = file.search {
            set(&mut result.search.top_k, s.top_k);
            set(&mut result.search.server_top_k, s.server_top_k);
            set(&mut result.search.min_similarity, s.min_similarity);
        }

        if let Some(s) = file.server {
            set(&mut result.server.bind, s.bind);
            set(&mut result.server.llm_endpoint, s.llm_endpoint);
            set(&mut result.server.llm_timeout_secs, s.llm_timeout_secs);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over everything else.
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(provider) = provider {
            self.embedding.provider = provider;
        }

        if let Some(model) = model {
            self.embedding.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .marquee directory.
    pub fn marquee_dir(&self) -> PathBuf {
        self.workspace.join(".marquee")
    }

    /// Corpus path resolved against the workspace.
    pub fn corpus_path(&self) -> PathBuf {
        self.resolve(&self.corpus_path)
    }

    /// Archive path resolved against the workspace.
    pub fn archive_path(&self) -> PathBuf {
        self.resolve(&self.archive_path)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.embedding.provider.as_str();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        let template = self.index.text_template.as_str();
        if !KNOWN_TEXT_TEMPLATES.contains(&template) {
            return Err(AppError::Config(format!(
                "Unknown text template: {}. Supported: {}",
                template,
                KNOWN_TEXT_TEMPLATES.join(", ")
            )));
        }

        if self.index.min_clusters == 0 || self.index.min_clusters > self.index.max_clusters {
            return Err(AppError::Config(format!(
                "Invalid cluster range: {}..={}",
                self.index.min_clusters, self.index.max_clusters
            )));
        }

        if self.embedding.concurrency == 0 {
            return Err(AppError::Config(
                "Embedding concurrency must be at least 1".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(AppError::Config(
                "Embedding batch size must be at least 1".to_string(),
            ));
        }

        if self.index.nprobe == 0 {
            return Err(AppError::Config("nprobe must be at least 1".to_string()));
        }

        Ok(())
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}
