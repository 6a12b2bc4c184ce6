//! REST API for QueueBell.
//!
//! Thin HTTP adapters over the lower crates:
//! - Tenant provisioning (create, read, update) behind the master key
//! - Telegram deep-link minting and the bot webhook
//! - The call pipeline (`notifyCounter`) and broadcast announcements
//! - Operator counter actions behind the tenant PIN
//! - Client configuration delivery
//!
//! # Example
//!
//! ```ignore
//! use queuebell_api::{ApiConfig, AppState, serve};
//! use queuebell_core::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::from_config(&config)?;
//!
//!     serve(ApiConfig::from_config(&config), state).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod types;

pub use config::ApiConfig;
pub use error::{ApiError, Result};
pub use router::{create_router, serve};
pub use state::AppState;
