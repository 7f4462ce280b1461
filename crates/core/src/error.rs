//! Error types for Civica.
//!
//! This module defines a unified error enum covering every failure category
//! in the system: configuration, I/O, source fetching, document parsing,
//! embedding, vector index access, and language-model calls.
//!
//! Refusals are not errors. A query the system declines to answer is a valid
//! terminal outcome and travels through the response types, never through
//! `AppError`.

use thiserror::Error;

/// Unified error type for Civica.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// We never panic — errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source fetch errors (HTTP failures, timeouts, non-2xx statuses)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Document parsing / text extraction errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index errors
    #[error("Index error: {0}")]
    Index(String),

    /// Language-model backend errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A sync run for this city is already in progress
    #[error("Sync already in progress for city '{0}'")]
    SyncInProgress(String),

    /// Malformed caller input (missing/too-short required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
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
