//! Error types for the persistence layer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Failed to read a file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A database path contains forbidden segments or characters.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// A write was attempted through a read-only scope.
    #[error("scope is read-only: {0}")]
    ReadOnly(String),

    /// Invalid identifier handed to the store.
    #[error(transparent)]
    Model(#[from] queuebell_models::ModelError),

    /// Network failure talking to a remote store.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote store answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl PersistenceError {
    /// True for failures worth surfacing as "try again" (network, 5xx, 429).
    pub fn is_transient(&self) -> bool {
        match self {
            PersistenceError::Http(_) => true,
            PersistenceError::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_transience() {
        let busy = PersistenceError::Upstream {
            status: 503,
            body: String::new(),
        };
        let denied = PersistenceError::Upstream {
            status: 401,
            body: "Permission denied".into(),
        };
        assert!(busy.is_transient());
        assert!(!denied.is_transient());
        assert!(!PersistenceError::InvalidPath("a/../b".into()).is_transient());
    }
}
