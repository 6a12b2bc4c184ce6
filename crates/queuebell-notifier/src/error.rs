//! Error types for the notifier.

use thiserror::Error;

use queuebell_persistence::PersistenceError;

/// Notifier errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request is unusable (missing number, bad tenant).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No bot token in the request or the server configuration.
    #[error("server misconfigured: {0}")]
    ServerMisconfigured(String),

    /// Reading the queue failed before anything was staged.
    #[error("store error: {0}")]
    Store(#[from] PersistenceError),

    /// Transitions were decided and messages sent, but the tenant patch
    /// did not land.
    #[error("persistence partial: {0}")]
    PersistencePartial(String),
}

/// Result type for notifier operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
