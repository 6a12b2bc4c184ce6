//! Error types for the migration.

use std::path::PathBuf;

use thiserror::Error;

use queuebell_core::ConfigError;
use queuebell_models::ModelError;
use queuebell_persistence::PersistenceError;

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid tenant: {0}")]
    Model(#[from] ModelError),

    #[error("database error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("failed to read map file {path}: {source}")]
    MapRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid map file {path}: {reason}")]
    MapFormat { path: PathBuf, reason: String },

    /// Neither `--slug` nor `--map` was given.
    #[error("either --slug or --map is required")]
    NoTarget,
}
