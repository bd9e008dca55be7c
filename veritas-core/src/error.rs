//! Error types for the Veritas data validation engine.
//!
//! This module provides the error handling strategy used across both crates,
//! built on `thiserror`. All errors are represented by the [`VeritasError`]
//! enum; the [`Result`] alias is used throughout.

use thiserror::Error;

/// The main error type for the Veritas engine.
///
/// Variants fall into three groups with different propagation policies:
///
/// - Programmer errors (`DuplicateMetric`, `UnknownMetric`, `InvalidMetric`,
///   `DuplicateAlias`) abort the enclosing call.
/// - Infrastructure errors (`Engine`, `Timeout`, `PoolTimeout`) are caught by
///   the runner at validator granularity and recorded as `ERROR` results.
/// - `Cancelled` stops the run loop; partial results are returned.
#[derive(Error, Debug)]
pub enum VeritasError {
    /// A metric key is already registered with a different builder.
    #[error("metric key '{key}' is already registered")]
    DuplicateMetric { key: String },

    /// A metric key was requested that is not registered.
    #[error("unknown metric key '{key}'")]
    UnknownMetric { key: String },

    /// A metric builder produced an expression the batch builder cannot use.
    #[error("invalid metric expression: {message}")]
    InvalidMetric { message: String },

    /// Two metric requests in one batch carry the same alias.
    #[error("duplicate alias '{alias}' in metric batch")]
    DuplicateAlias { alias: String },

    /// Invalid configuration: unknown validator type, missing column,
    /// malformed regex, unsafe SQL fragment.
    #[error("configuration error: {0}")]
    Config(String),

    /// A SQL statement failed to compile or execute on a backend.
    #[error("engine error while running '{sql}': {message}")]
    Engine {
        /// The statement that failed
        sql: String,
        /// Backend error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A per-binding timeout expired.
    #[error("statement timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// No pooled connection became available within the pool timeout.
    #[error("connection pool exhausted after waiting {ms}ms")]
    PoolTimeout { ms: u64 },

    /// The run was cancelled between bindings.
    #[error("run cancelled")]
    Cancelled,

    /// An operation is not supported by this implementation.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from serialization or deserialization.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, VeritasError>`.
pub type Result<T> = std::result::Result<T, VeritasError>;

impl VeritasError {
    /// Creates an engine error for a failed statement.
    pub fn engine(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            sql: sql.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates an engine error wrapping the backend error.
    pub fn engine_with_source(
        sql: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Engine {
            sql: sql.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates an invalid-metric error.
    pub fn invalid_metric(message: impl Into<String>) -> Self {
        Self::InvalidMetric {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if this error should be recorded as an `ERROR` result
    /// rather than aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VeritasError::Engine { .. }
                | VeritasError::Timeout { .. }
                | VeritasError::PoolTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for VeritasError {
    fn from(err: serde_json::Error) -> Self {
        VeritasError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_engine_error_display() {
        let err = VeritasError::engine("SELECT 1", "no such table");
        assert_eq!(
            err.to_string(),
            "engine error while running 'SELECT 1': no such table"
        );
    }

    #[test]
    fn test_engine_error_preserves_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = VeritasError::engine_with_source("SELECT 1", Box::new(source));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(VeritasError::engine("SELECT 1", "boom").is_recoverable());
        assert!(VeritasError::Timeout { ms: 100 }.is_recoverable());
        assert!(VeritasError::PoolTimeout { ms: 100 }.is_recoverable());
        assert!(!VeritasError::DuplicateAlias {
            alias: "v0".to_string()
        }
        .is_recoverable());
        assert!(!VeritasError::Cancelled.is_recoverable());
    }
}
