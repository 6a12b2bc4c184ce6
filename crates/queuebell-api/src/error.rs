//! API error types.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use queuebell_models::ModelError;
use queuebell_notifier::NotifyError;
use queuebell_persistence::PersistenceError;
use queuebell_telegram::{TelegramError, TokenError};

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// API error type for consistent `{error, message}` responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    InvalidInput(String),

    /// Missing or wrong master key or PIN.
    #[error("{0}")]
    Unauthorized(String),

    /// Tenant, counter or ticket does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The resource already exists; `existing` is returned to the caller.
    #[error("{message}")]
    Conflict { message: String, existing: Value },

    #[error("start token has expired")]
    ExpiredToken,

    #[error("start token is invalid")]
    InvalidToken,

    /// A remote dependency failed after retries.
    #[error("{0}")]
    Upstream(String),

    /// Decisions were made but the tenant write did not land.
    #[error("{0}")]
    PersistencePartial(String),

    /// Required credentials or settings are missing.
    #[error("{0}")]
    ServerMisconfigured(String),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::ExpiredToken | ApiError::InvalidToken => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::PersistencePartial(_)
            | ApiError::ServerMisconfigured(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict { .. } => "conflict",
            ApiError::ExpiredToken => "expired_token",
            ApiError::InvalidToken => "invalid_token",
            ApiError::Upstream(_) => "upstream_unavailable",
            ApiError::PersistencePartial(_) => "persistence_partial",
            ApiError::ServerMisconfigured(_) => "server_misconfigured",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let ApiError::Conflict { existing, .. } = self {
            body["existing"] = existing;
        }
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        if err.is_transient() {
            return ApiError::Upstream(err.to_string());
        }
        match err {
            PersistenceError::InvalidPath(_) | PersistenceError::Model(_) => {
                ApiError::InvalidInput(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NothingWaiting(_) | ModelError::CounterExhausted(_) => ApiError::Conflict {
                message: err.to_string(),
                existing: Value::Null,
            },
            _ => ApiError::InvalidInput(err.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::ExpiredToken => ApiError::ExpiredToken,
            TokenError::InvalidToken => ApiError::InvalidToken,
        }
    }
}

impl From<TelegramError> for ApiError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::NoToken => ApiError::ServerMisconfigured(err.to_string()),
            TelegramError::Token(e) => e.into(),
            TelegramError::Persistence(e) => e.into(),
            TelegramError::HttpError(_) => ApiError::Upstream(err.to_string()),
            TelegramError::Api { status, .. } if status >= 500 => ApiError::Upstream(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<NotifyError> for ApiError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            NotifyError::ServerMisconfigured(msg) => ApiError::ServerMisconfigured(msg),
            NotifyError::Store(e) => e.into(),
            NotifyError::PersistencePartial(msg) => ApiError::PersistencePartial(msg),
        }
    }
}
