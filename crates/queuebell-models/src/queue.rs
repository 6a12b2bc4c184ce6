//! Queue records as stored at `tenants/{slug}/queue/{ticketId}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::number::{normalize, series};

/// Accepts a string or a number and yields a string.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn default_status() -> String {
    "waiting".to_string()
}

/// One queue record written by the customer page and the operator console.
///
/// Only the fields the backend reads are typed; everything else is kept in
/// `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub full_number: Option<String>,
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub recipient_full: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub telegram_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_name: Option<String>,
    #[serde(default, with = "crate::time::flexible", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for QueueEntry {
    fn default() -> Self {
        Self {
            number: None,
            queue_id: None,
            full_number: None,
            recipient_full: None,
            series: None,
            status: default_status(),
            chat_id: None,
            telegram_connected: false,
            counter_id: None,
            counter_name: None,
            created_at: None,
            extra: Map::new(),
        }
    }
}

impl QueueEntry {
    /// Parses a raw node; malformed nodes yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// The customer's number as displayed: full number, then number, then queue id.
    pub fn display_number(&self) -> Option<&str> {
        self.full_number
            .as_deref()
            .or(self.recipient_full.as_deref())
            .or(self.number.as_deref())
            .or(self.queue_id.as_deref())
    }

    /// Normalized number used for matching.
    pub fn normalized_number(&self) -> Option<String> {
        self.display_number()
            .map(normalize)
            .filter(|n| !n.is_empty())
    }

    /// Stored series, or the one derived from the number.
    pub fn series(&self) -> Option<String> {
        self.series
            .as_deref()
            .map(normalize)
            .filter(|s| !s.is_empty())
            .or_else(|| self.display_number().map(series))
    }

    pub fn is_waiting(&self) -> bool {
        self.status.eq_ignore_ascii_case("waiting")
    }
}
