//! Response DTOs for the API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use queuebell_core::FirebaseClientConfig;
use queuebell_models::{Counter, Tenant, TenantLinks, TenantSettings};
use queuebell_notifier::NotifyResponse;
use queuebell_telegram::SendOutcome;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Realtime database backend.
    pub database: String,
    /// Ticket store backend.
    pub tickets: String,
    pub telegram: bool,
}

/// Tenant as seen by clients; the operator PIN is never included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessResponse {
    pub ok: bool,
    pub slug: String,
    pub name: Option<String>,
    pub status: Option<Value>,
    pub settings: TenantSettings,
    pub links: TenantLinks,
    pub pin_required: bool,
}

/// Result of `createBusiness`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedBusinessResponse {
    pub ok: bool,
    pub slug: String,
    pub tenant: Tenant,
}

/// Result of `updateBusiness`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdatedBusinessResponse {
    pub ok: bool,
    pub slug: String,
    /// Tenant-relative paths written.
    pub updated: Vec<String>,
}

/// Result of `createTelegramLink`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub ok: bool,
    pub link: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

/// Per-subscriber result of a broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceResult {
    pub chat_id: String,
    pub send_res: SendOutcome,
}

/// Result of `announce`.
#[derive(Debug, Clone, Serialize)]
pub struct AnnounceResponse {
    pub ok: bool,
    pub tenant: String,
    pub recipients: usize,
    pub delivered: usize,
    /// Subscribers dropped because their chat is unreachable.
    pub removed: Vec<String>,
    pub results: Vec<AnnounceResult>,
}

/// Result of a counter action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterResponse {
    pub ok: bool,
    pub action: String,
    pub counter_id: String,
    /// `None` after `remove`.
    pub counter: Option<Counter>,
    /// Number issued or called by this action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifyResponse>,
}

/// Result of `verifyPin`.
#[derive(Debug, Clone, Serialize)]
pub struct PinResponse {
    pub ok: bool,
    pub required: bool,
}

/// Client configuration served by `env`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvResponse {
    pub ok: bool,
    pub tenant: Option<String>,
    pub firebase: FirebaseClientConfig,
    pub bot_username: Option<String>,
    pub telegram_enabled: bool,
}
