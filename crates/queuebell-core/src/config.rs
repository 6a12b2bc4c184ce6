//! Shared configuration for QueueBell.
//!
//! Provides functions to locate QueueBell's state directory and the typed
//! [`Config`] every binary builds from its environment.
//!
//! # Storage Structure
//!
//! Local state lives under `~/.queuebell/`:
//!
//! ```text
//! ~/.queuebell/
//! ├── config/       # .env.local with secrets
//! └── state/        # tickets.json (local ticket store fallback)
//! ```
//!
//! # Environment Variables
//!
//! Paths:
//! - `QUEUEBELL_STATE_DIR`: Override the base state directory
//! - `QUEUEBELL_CONFIG_DIR`: Override the config directory
//! - `QUEUEBELL_TICKETS_FILE`: Override the local ticket store file
//!
//! Services:
//! - `FIREBASE_DB_URL`, `FIREBASE_DB_SECRET`: realtime database
//! - `KV_REST_API_URL`, `KV_REST_API_TOKEN`: shared ticket cache
//! - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_BOT_USERNAME`, `TELEGRAM_WEBHOOK_SECRET`
//! - `MASTER_KEY`: admin endpoints

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "QUEUEBELL_STATE_DIR";

/// Environment variable for custom config directory.
pub const CONFIG_DIR_ENV: &str = "QUEUEBELL_CONFIG_DIR";

/// Environment variable for the local ticket store file.
pub const TICKETS_FILE_ENV: &str = "QUEUEBELL_TICKETS_FILE";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".queuebell";

const CONFIG_SUBDIR: &str = "config";
const STATE_SUBDIR: &str = "state";

const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
const DEFAULT_SEND_PAUSE_MS: u64 = 90;
const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 25_000;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8787;

/// Get the QueueBell state directory.
///
/// The state directory is determined by:
/// 1. `QUEUEBELL_STATE_DIR` environment variable if set
/// 2. `~/.queuebell` if home directory is available
/// 3. `.queuebell` in current directory as fallback
pub fn state_dir() -> PathBuf {
    std::env::var(STATE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_STATE_DIR))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
        })
}

/// Get the user config directory.
pub fn config_dir() -> PathBuf {
    std::env::var(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join(CONFIG_SUBDIR))
}

/// Get the runtime state directory.
pub fn runtime_state_dir() -> PathBuf {
    state_dir().join(STATE_SUBDIR)
}

/// Get the local ticket store file.
pub fn tickets_file() -> PathBuf {
    std::env::var(TICKETS_FILE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| runtime_state_dir().join("tickets.json"))
}

/// Get the .env.local file path.
pub fn env_file() -> PathBuf {
    config_dir().join(".env.local")
}

/// Loads `~/.queuebell/config/.env.local`, then `.env.local` or `.env`
/// from the working directory. Variables already set win.
pub fn load_env_files() {
    let env_path = env_file();
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    let _ = dotenvy::from_filename(".env.local").or_else(|_| dotenvy::dotenv());
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is present but unparseable.
    #[error("invalid value for {name}: {value}")]
    Invalid { name: String, value: String },

    /// A variable required by the current command is missing.
    #[error("{0} is not set")]
    Missing(&'static str),
}

/// Connection details for the shared KV ticket cache.
#[derive(Clone)]
pub struct KvConfig {
    pub url: String,
    pub token: String,
}

impl fmt::Debug for KvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Which ticket store backend a process uses.
#[derive(Debug, Clone)]
pub enum TicketBackend {
    /// Shared REST KV (durable across invocations).
    Kv(KvConfig),
    /// Local JSON file.
    File(PathBuf),
}

/// Public web-client configuration served by the `env` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,
    #[serde(rename = "databaseURL", skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

/// Process configuration.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub database_secret: Option<String>,
    pub ticket_backend: TicketBackend,
    pub bot_token: Option<String>,
    pub bot_username: Option<String>,
    pub webhook_secret: Option<String>,
    pub telegram_api_base: String,
    pub master_key: Option<String>,
    pub announce_requires_key: bool,
    pub default_tenant: Option<String>,
    pub explore_url: Option<String>,
    pub status_url: Option<String>,
    pub send_pause: Duration,
    pub handler_timeout: Duration,
    pub firebase_client: FirebaseClientConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("database_secret", &redact(&self.database_secret))
            .field("ticket_backend", &self.ticket_backend)
            .field("bot_token", &redact(&self.bot_token))
            .field("bot_username", &self.bot_username)
            .field("master_key", &redact(&self.master_key))
            .field("default_tenant", &self.default_tenant)
            .field("send_pause", &self.send_pause)
            .field("handler_timeout", &self.handler_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: None,
            database_secret: None,
            ticket_backend: TicketBackend::File(tickets_file()),
            bot_token: None,
            bot_username: None,
            webhook_secret: None,
            telegram_api_base: DEFAULT_TELEGRAM_API.to_string(),
            master_key: None,
            announce_requires_key: false,
            default_tenant: None,
            explore_url: None,
            status_url: None,
            send_pause: Duration::from_millis(DEFAULT_SEND_PAUSE_MS),
            handler_timeout: Duration::from_millis(DEFAULT_HANDLER_TIMEOUT_MS),
            firebase_client: FirebaseClientConfig::default(),
        }
    }
}

impl Config {
    /// Builds the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let ticket_backend = match (get("KV_REST_API_URL"), get("KV_REST_API_TOKEN")) {
            (Some(url), Some(token)) => TicketBackend::Kv(KvConfig { url, token }),
            _ => TicketBackend::File(
                get(TICKETS_FILE_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(tickets_file),
            ),
        };

        let config = Self {
            host: get("QUEUEBELL_HOST").unwrap_or(defaults.host),
            port: parse_or(get("QUEUEBELL_PORT"), "QUEUEBELL_PORT", defaults.port)?,
            database_url: get("FIREBASE_DB_URL").map(|u| u.trim_end_matches('/').to_string()),
            database_secret: get("FIREBASE_DB_SECRET"),
            ticket_backend,
            bot_token: get("TELEGRAM_BOT_TOKEN"),
            bot_username: get("TELEGRAM_BOT_USERNAME").map(|u| u.trim_start_matches('@').to_string()),
            webhook_secret: get("TELEGRAM_WEBHOOK_SECRET"),
            telegram_api_base: get("TELEGRAM_API_BASE").unwrap_or(defaults.telegram_api_base),
            master_key: get("MASTER_KEY"),
            announce_requires_key: parse_bool(get("ANNOUNCE_REQUIRES_KEY"), "ANNOUNCE_REQUIRES_KEY")?,
            default_tenant: get("QUEUEBELL_DEFAULT_TENANT"),
            explore_url: get("QUEUEBELL_EXPLORE_URL"),
            status_url: get("QUEUEBELL_STATUS_URL"),
            send_pause: Duration::from_millis(parse_or(
                get("QUEUEBELL_SEND_PAUSE_MS"),
                "QUEUEBELL_SEND_PAUSE_MS",
                DEFAULT_SEND_PAUSE_MS,
            )?),
            handler_timeout: Duration::from_millis(parse_or(
                get("QUEUEBELL_HANDLER_TIMEOUT_MS"),
                "QUEUEBELL_HANDLER_TIMEOUT_MS",
                DEFAULT_HANDLER_TIMEOUT_MS,
            )?),
            firebase_client: FirebaseClientConfig {
                api_key: get("FIREBASE_API_KEY"),
                auth_domain: get("FIREBASE_AUTH_DOMAIN"),
                database_url: get("FIREBASE_DB_URL"),
                project_id: get("FIREBASE_PROJECT_ID"),
                app_id: get("FIREBASE_APP_ID"),
            },
        };
        debug!(config = ?config, "Loaded configuration");
        Ok(config)
    }

    /// Database URL, or an error naming the missing variable.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("FIREBASE_DB_URL"))
    }

    /// Returns the bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value,
        }),
    }
}

fn parse_bool(raw: Option<String>, name: &str) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            name: name.to_string(),
            value: other.to_string(),
        }),
    }
}
