//! Error types for model validation.

use thiserror::Error;

/// Errors raised when a value violates a model invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Slug is not lowercase `a-z0-9-` or has a bad length.
    #[error("invalid slug '{0}': use 2-40 characters of a-z, 0-9 and '-'")]
    InvalidSlug(String),

    /// Counter prefix is not 1-5 characters of A-Z0-9.
    #[error("invalid counter prefix '{0}': use 1-5 characters of A-Z and 0-9")]
    InvalidPrefix(String),

    /// Counter has no issued number left to call.
    #[error("no waiting numbers on counter '{0}'")]
    NothingWaiting(String),

    /// Counter has issued every number it can represent.
    #[error("counter '{0}' has no numbers left; reset it")]
    CounterExhausted(String),

    /// Reset base would break `nowServing <= lastIssued`.
    #[error("invalid reset base {0}")]
    InvalidBase(u32),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
