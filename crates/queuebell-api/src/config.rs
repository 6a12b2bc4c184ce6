//! API configuration.

use std::time::Instant;

use queuebell_core::{Config, FirebaseClientConfig};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
    /// Admin key for provisioning endpoints.
    pub master_key: Option<String>,
    /// Whether `announce` demands the master key.
    pub announce_requires_key: bool,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`, when set.
    pub webhook_secret: Option<String>,
    /// Bot username used in deep links.
    pub bot_username: Option<String>,
    /// Tenant assumed when a request names none.
    pub default_tenant: Option<String>,
    /// Public web-client configuration.
    pub firebase_client: FirebaseClientConfig,
}

impl ApiConfig {
    /// Creates a new API configuration with the given host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Takes host, port and credentials from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            cors_origins: vec!["*".to_string()],
            start_time: Instant::now(),
            master_key: config.master_key.clone(),
            announce_requires_key: config.announce_requires_key,
            webhook_secret: config.webhook_secret.clone(),
            bot_username: config.bot_username.clone(),
            default_tenant: config.default_tenant.clone(),
            firebase_client: config.firebase_client.clone(),
        }
    }

    /// Sets the CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Sets the master key.
    pub fn with_master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    /// Sets the bot username.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into().trim_start_matches('@').to_string());
        self
    }

    /// Sets the webhook secret.
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Sets the default tenant.
    pub fn with_default_tenant(mut self, slug: impl Into<String>) -> Self {
        self.default_tenant = Some(slug.into());
        self
    }

    /// Returns the bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            cors_origins: vec!["*".to_string()],
            start_time: Instant::now(),
            master_key: None,
            announce_requires_key: false,
            webhook_secret: None,
            bot_username: None,
            default_tenant: None,
            firebase_client: FirebaseClientConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8787);
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
        assert!(config.master_key.is_none());
    }

    #[test]
    fn test_api_config_bind_address() {
        let config = ApiConfig::new("0.0.0.0", 3000);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_api_config_builders() {
        let config = ApiConfig::default()
            .with_master_key("s3cret")
            .with_bot_username("@QueueBellBot")
            .with_cors_origins(vec!["https://cafe.example".to_string()]);
        assert_eq!(config.master_key.as_deref(), Some("s3cret"));
        assert_eq!(config.bot_username.as_deref(), Some("QueueBellBot"));
        assert_eq!(config.cors_origins, vec!["https://cafe.example".to_string()]);
    }

    #[test]
    fn test_api_config_from_process_config() {
        let mut process = Config::default();
        process.port = 9001;
        process.master_key = Some("k".into());
        process.announce_requires_key = true;

        let config = ApiConfig::from_config(&process);
        assert_eq!(config.port, 9001);
        assert_eq!(config.master_key.as_deref(), Some("k"));
        assert!(config.announce_requires_key);
    }
}
