//! QueueBell notifier.
//!
//! Runs when an operator calls a number: decides for every waiting customer
//! whether they were served, should be reminded, or can be dropped, then
//! sends the Telegram messages and records the outcome.

pub mod error;
pub mod pipeline;
pub mod request;

pub use error::{NotifyError, Result};
pub use pipeline::{Notifier, NotifierConfig};
pub use request::{
    Action, NotifyRequest, NotifyResponse, PatchReport, PersistenceReport, RecipientInput,
    RecipientResult,
};
