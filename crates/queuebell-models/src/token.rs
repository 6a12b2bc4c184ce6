//! Persisted start-token records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::queue::string_or_number;

/// Lifetime of a minted start token.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Record stored at `telegramTokens/{token}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTokenRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_key: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub queue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, with = "crate::time::flexible", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::flexible", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub used: bool,
    #[serde(default, with = "crate::time::flexible", skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_queue_key: Option<String>,
}

impl StartTokenRecord {
    /// Creates a fresh record for a queue key with the standard 24 h TTL.
    pub fn new(queue_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            queue_key: Some(queue_key.into()),
            created_at: Some(now),
            expires_at: Some(now + Duration::hours(TOKEN_TTL_HOURS)),
            ..Default::default()
        }
    }

    /// True when `expires_at` lies in the past.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }

    /// True when the token was already used by a different chat.
    pub fn used_by_other(&self, chat_id: &str) -> bool {
        self.used && self.chat_id.as_deref().is_some_and(|c| c != chat_id)
    }
}
