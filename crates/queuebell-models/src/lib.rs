//! Core data models for QueueBell.
//!
//! This crate provides the fundamental data types shared by every QueueBell
//! service: tenants, counters, tickets, start-token records and the
//! per-series service statistics, plus the number normalization rules that
//! decide who gets notified when a number is called.

pub mod counter;
pub mod error;
pub mod ids;
pub mod number;
pub mod queue;
pub mod stats;
pub mod tenant;
pub mod ticket;
pub mod time;
pub mod token;

// Re-export main types
pub use counter::Counter;
pub use error::{ModelError, Result};
pub use ids::{push_id, random_token, Slug};
pub use number::{format_number, is_behind, is_match, normalize, numeric_tail, same_series, series};
pub use queue::QueueEntry;
pub use stats::{SeriesStats, ServiceEvent, StatsSnapshot, MOVING_WINDOW};
pub use tenant::{PrivacySettings, Tenant, TenantLinks, TenantSettings, TenantStatus};
pub use ticket::{Ticket, TicketStatus, STALE_AFTER_HOURS};
pub use token::{StartTokenRecord, TOKEN_TTL_HOURS};
