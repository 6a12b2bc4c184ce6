//! Ticket state and transitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::number::{normalize, series};

/// Tickets older than this (and not being called) are cancelled as stale.
pub const STALE_AFTER_HOURS: i64 = 24;

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Issued and waiting to be called.
    #[default]
    Waiting,
    /// Called but not yet marked served.
    Called,
    /// Served (terminal).
    Served,
    /// Cancelled (terminal).
    Cancelled,
}

impl TicketStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Called => "called",
            TicketStatus::Served => "served",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    /// True for served and cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Served | TicketStatus::Cancelled)
    }
}

/// A customer's in-flight number, as tracked by the call pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Primary identity inside a tenant.
    pub ticket_key: String,
    /// Queue record key, when the ticket came from the tenant queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    /// Linked Telegram chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Normalized number held by the customer.
    pub their_number: String,
    /// Series of `their_number`.
    pub series: String,
    pub created_at: DateTime<Utc>,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified_stay_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_at_ms: Option<i64>,
    #[serde(default)]
    pub status: TicketStatus,
}

impl Ticket {
    /// Builds the ticket key: the queue id when known, else `"{chatId}|{number}"`.
    pub fn key_for(ticket_id: Option<&str>, chat_id: Option<&str>, number: &str) -> String {
        match ticket_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("{}|{}", chat_id.unwrap_or_default(), normalize(number)),
        }
    }

    /// Creates a waiting ticket.
    pub fn new(
        ticket_id: Option<String>,
        chat_id: Option<String>,
        number: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        let ticket_key = Self::key_for(ticket_id.as_deref(), chat_id.as_deref(), number);
        Self {
            ticket_key,
            ticket_id,
            chat_id,
            their_number: normalize(number),
            series: series(number),
            created_at,
            created_at_ms: created_at.timestamp_millis(),
            expires_at: Some(created_at + Duration::hours(STALE_AFTER_HOURS)),
            notified_stay_at: None,
            last_reminder_ms: None,
            called_at: None,
            served_at: None,
            served_at_ms: None,
            status: TicketStatus::Waiting,
        }
    }

    /// Age of the ticket at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Strictly older than 24 hours; exactly 24 hours is not stale.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > Duration::hours(STALE_AFTER_HOURS)
    }

    /// True once the ticket has been served.
    pub fn is_served(&self) -> bool {
        self.served_at.is_some()
    }

    /// Marks the ticket served and returns the service time in milliseconds.
    pub fn mark_served(&mut self, now: DateTime<Utc>) -> i64 {
        let now_ms = now.timestamp_millis();
        self.called_at = Some(now);
        self.served_at = Some(now);
        self.served_at_ms = Some(now_ms);
        self.status = TicketStatus::Served;
        (now_ms - self.created_at_ms).max(0)
    }

    /// Records that a "stay nearby" reminder was sent.
    pub fn mark_reminded(&mut self, now: DateTime<Utc>) {
        self.notified_stay_at = Some(now);
        self.last_reminder_ms = Some(now.timestamp_millis());
    }

    /// Marks the ticket cancelled.
    pub fn mark_cancelled(&mut self) {
        self.status = TicketStatus::Cancelled;
    }
}
