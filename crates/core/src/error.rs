//! Error types for Marquee.
//!
//! This module defines a unified error enum that covers every failure the
//! indexing pipeline, the query engine and the service facade can surface.

use thiserror::Error;

/// Unified error type for Marquee.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The corpus file could not be read or is not a JSON array
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// A single item could not be embedded (recoverable, item is skipped)
    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    /// The query text could not be embedded; fails only the current request
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// No document embedded successfully, so no index can be built
    #[error("Corpus too small: {0}")]
    CorpusTooSmall(String),

    /// Query vector and index were produced by differently-sized models
    #[error("Dimension mismatch: index expects {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Malformed or truncated index archive
    #[error("Corrupt index archive: {0}")]
    PersistenceCorruption(String),

    /// Index construction errors (clustering, geometry)
    #[error("Index error: {0}")]
    Index(String),

    /// Text-generation upstream errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Invalid input supplied by the caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the error was caused by the caller rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::InvalidRequest(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
