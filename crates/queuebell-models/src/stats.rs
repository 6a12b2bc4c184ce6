//! Per-series service statistics and service events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Size of the moving window kept per series.
pub const MOVING_WINDOW: usize = 10;

/// Aggregate service times for one series of a tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeriesStats {
    pub total_served: u64,
    pub total_service_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_service_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_service_ms: Option<u64>,
    /// Service times of the last [`MOVING_WINDOW`] served tickets, oldest first.
    pub moving_avg_last_n: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_served_at: Option<DateTime<Utc>>,
}

impl SeriesStats {
    /// Folds one served ticket into the aggregate.
    pub fn record(&mut self, service_ms: u64, served_at: DateTime<Utc>) {
        self.total_served += 1;
        self.total_service_ms += service_ms;
        self.min_service_ms = Some(self.min_service_ms.map_or(service_ms, |m| m.min(service_ms)));
        self.max_service_ms = Some(self.max_service_ms.map_or(service_ms, |m| m.max(service_ms)));
        self.moving_avg_last_n.push(service_ms);
        if self.moving_avg_last_n.len() > MOVING_WINDOW {
            let excess = self.moving_avg_last_n.len() - MOVING_WINDOW;
            self.moving_avg_last_n.drain(..excess);
        }
        self.last_served_at = Some(served_at);
    }

    /// Mean service time over every served ticket.
    pub fn mean_service_ms(&self) -> Option<f64> {
        if self.total_served == 0 {
            return None;
        }
        Some(self.total_service_ms as f64 / self.total_served as f64)
    }

    /// Mean over the moving window.
    pub fn moving_average_ms(&self) -> Option<f64> {
        if self.moving_avg_last_n.is_empty() {
            return None;
        }
        let sum: u64 = self.moving_avg_last_n.iter().sum();
        Some(sum as f64 / self.moving_avg_last_n.len() as f64)
    }

    /// Read-only view returned to the operator console.
    pub fn snapshot(&self, series: &str) -> StatsSnapshot {
        StatsSnapshot {
            series: series.to_string(),
            total_served: self.total_served,
            mean_service_ms: self.mean_service_ms(),
            min_service_ms: self.min_service_ms,
            max_service_ms: self.max_service_ms,
            moving_average_ms: self.moving_average_ms(),
            last_served_at: self.last_served_at,
        }
    }
}

/// Serializable summary of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub series: String,
    pub total_served: u64,
    pub mean_service_ms: Option<f64>,
    pub min_service_ms: Option<u64>,
    pub max_service_ms: Option<u64>,
    pub moving_average_ms: Option<f64>,
    pub last_served_at: Option<DateTime<Utc>>,
}

/// Append-only record written when a ticket is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEvent {
    pub ticket_id: String,
    pub requested_at: DateTime<Utc>,
    pub served_at: DateTime<Utc>,
    pub service_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<String>,
    pub series: String,
}
