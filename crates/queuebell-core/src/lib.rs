//! QueueBell Core - configuration shared by the server and the CLI tools.
//!
//! - **config**: state/config directory layout, `.env` loading and the
//!   typed [`Config`] built from environment variables.

pub mod config;

pub use config::{
    config_dir, env_file, load_env_files, runtime_state_dir, state_dir, tickets_file, Config,
    ConfigError, FirebaseClientConfig, KvConfig, TicketBackend,
};
