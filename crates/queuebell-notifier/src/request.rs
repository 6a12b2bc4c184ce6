//! Request and response shapes of the notify endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use queuebell_models::queue::string_or_number;
use queuebell_models::StatsSnapshot;
use queuebell_persistence::FlushReport;
use queuebell_telegram::{ButtonSpec, SendOutcome};

/// Body of `POST /api/notifyCounter`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub called_full: Option<String>,
    #[serde(default)]
    pub counter_name: Option<String>,
    /// Explicit recipients; the queue is read when absent or empty.
    #[serde(default)]
    pub recipients: Option<Vec<RecipientInput>>,
    #[serde(default)]
    pub inline_buttons: Vec<Vec<ButtonSpec>>,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub explore_url: Option<String>,
}

/// A recipient supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientInput {
    #[serde(default, deserialize_with = "string_or_number")]
    pub chat_id: Option<String>,
    #[serde(default, alias = "ticketNumber", deserialize_with = "string_or_number")]
    pub their_number: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub queue_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub ticket_id: Option<String>,
    #[serde(default, with = "queuebell_models::time::flexible")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub telegram_connected: Option<bool>,
}

impl RecipientInput {
    /// The number to classify: `theirNumber`, else `queueId`.
    pub fn number(&self) -> Option<&str> {
        self.their_number
            .as_deref()
            .or(self.queue_id.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

/// What happened to one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Served,
    Reminder,
    SkippedAhead,
    SkippedAlreadyServed,
    CancelledStale,
}

impl Action {
    /// Whether this action produces a Telegram message.
    pub fn sends(&self) -> bool {
        matches!(self, Action::Served | Action::Reminder)
    }
}

/// Per-recipient entry of the response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientResult {
    pub chat_id: Option<String>,
    pub ticket_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub their_number: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_res: Option<SendOutcome>,
}

/// Outcome of the single tenant patch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    pub applied: bool,
    pub keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What was written where.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceReport {
    pub tickets: FlushReport,
    pub patch: PatchReport,
    /// Sends cut short by the handler budget.
    pub timed_out: usize,
}

/// Response of `POST /api/notifyCounter`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyResponse {
    pub ok: bool,
    pub called_full: String,
    pub called_series: String,
    pub counter_name: Option<String>,
    pub sent: usize,
    pub results: Vec<RecipientResult>,
    pub stats_snapshot: Option<StatsSnapshot>,
    pub persistence: PersistenceReport,
    pub tenant: String,
}
