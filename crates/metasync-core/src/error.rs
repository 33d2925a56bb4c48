//! Error types for metadata synchronization.
//!
//! Every failure that crosses a component boundary is a [`MetasyncError`].
//! The type is `Clone` so a cached initialization failure can be handed to
//! every caller waiting on the same service gate.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Main error type for the metasync library.
#[derive(Debug, Clone, Error)]
pub enum MetasyncError {
    // Remote report errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Metadata not found: {key}")]
    NotFound { key: String },

    // Storage errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Arc<rusqlite::Error>>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<Arc<serde_json::Error>>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for metasync operations.
pub type Result<T> = std::result::Result<T, MetasyncError>;

impl From<std::io::Error> for MetasyncError {
    fn from(err: std::io::Error) -> Self {
        MetasyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(Arc::new(err)),
        }
    }
}

impl From<serde_json::Error> for MetasyncError {
    fn from(err: serde_json::Error) -> Self {
        MetasyncError::Json {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<rusqlite::Error> for MetasyncError {
    fn from(err: rusqlite::Error) -> Self {
        MetasyncError::Database {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl MetasyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MetasyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(Arc::new(err)),
        }
    }

    /// Create a not-found error for a store key.
    pub fn not_found(key: impl Into<String>) -> Self {
        MetasyncError::NotFound { key: key.into() }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MetasyncError::Network { .. } | MetasyncError::Timeout(_)
        )
    }

    /// Whether the remote store simply had no record for the key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetasyncError::NotFound { .. })
    }
}
