//! Error types for the Telegram side of QueueBell.

use thiserror::Error;

use queuebell_persistence::PersistenceError;

/// Start-token failures. Both are shown to the customer as replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not decodable in any accepted encoding.
    #[error("invalid start token")]
    InvalidToken,

    /// Decoded but past its expiry.
    #[error("start token expired")]
    ExpiredToken,
}

/// Errors that can occur talking to Telegram or linking chats.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Bot token not configured.
    #[error("Telegram bot token not set. Set TELEGRAM_BOT_TOKEN environment variable.")]
    NoToken,

    /// The chat blocked the bot, was deactivated or does not exist.
    #[error("chat unreachable: {0}")]
    Blocked(String),

    /// The Bot API rejected the call.
    #[error("Bot API error {status}: {description}")]
    Api { status: u16, description: String },

    /// Network failure after all attempts.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Start token problem.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Database failure while linking.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for Telegram operations.
pub type Result<T> = std::result::Result<T, TelegramError>;

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        TelegramError::HttpError(e.to_string())
    }
}
