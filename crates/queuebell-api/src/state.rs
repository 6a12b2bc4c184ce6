//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use queuebell_core::Config;
use queuebell_models::Slug;
use queuebell_notifier::{Notifier, NotifierConfig};
use queuebell_persistence::{FirebaseDb, MemoryDb, RealtimeDb, TicketStoreFactory};
use queuebell_telegram::{LinkingWebhook, TelegramClient, WebhookConfig};

use crate::config::ApiConfig;
use crate::error::{ApiError, Result};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: Arc<ApiConfig>,
    /// Realtime database holding every tenant.
    pub db: Arc<dyn RealtimeDb>,
    /// Call pipeline.
    pub notifier: Notifier,
    /// Bot API client; `None` when no bot token is configured.
    pub telegram: Option<TelegramClient>,
    /// Linking webhook; present whenever `telegram` is.
    pub webhook: Option<Arc<LinkingWebhook>>,
    /// Pause between broadcast messages.
    pub send_pause: Duration,
    /// Backend names reported by the health endpoint.
    pub database: &'static str,
}

impl AppState {
    /// Creates a new AppState with all components.
    pub fn new(
        config: ApiConfig,
        db: Arc<dyn RealtimeDb>,
        notifier: Notifier,
        telegram: Option<TelegramClient>,
        webhook_config: WebhookConfig,
    ) -> Self {
        let webhook = telegram
            .clone()
            .map(|client| Arc::new(LinkingWebhook::new(db.clone(), client, webhook_config)));
        Self {
            send_pause: notifier.config().send_pause,
            config: Arc::new(config),
            db,
            notifier,
            telegram,
            webhook,
            database: "memory",
        }
    }

    /// Names the database backend for the health endpoint.
    pub fn with_database_name(mut self, name: &'static str) -> Self {
        self.database = name;
        self
    }

    /// Builds every component from the process configuration.
    ///
    /// Without `FIREBASE_DB_URL` the server runs on an in-memory database,
    /// which is only useful for local development.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (db, database): (Arc<dyn RealtimeDb>, &'static str) = match config.database_url.as_deref() {
            Some(url) => (
                Arc::new(FirebaseDb::new(url, config.database_secret.clone())?),
                "firebase",
            ),
            None => {
                warn!("FIREBASE_DB_URL not set, using an in-memory database");
                (Arc::new(MemoryDb::new()), "memory")
            }
        };

        let tickets = TicketStoreFactory::from_backend(&config.ticket_backend)?;
        info!(backend = tickets.name(), "Ticket store configured");

        let telegram = match config.bot_token.as_deref() {
            Some(token) => Some(
                TelegramClient::new(token)
                    .map_err(|e| ApiError::ServerMisconfigured(e.to_string()))?
                    .with_base_url(config.telegram_api_base.clone()),
            ),
            None => {
                warn!("TELEGRAM_BOT_TOKEN not set, webhook and announce are disabled");
                None
            }
        };

        let default_tenant = config.default_tenant.as_deref().and_then(|raw| match Slug::parse(raw) {
            Ok(slug) => Some(slug),
            Err(e) => {
                warn!(error = %e, "Ignoring invalid QUEUEBELL_DEFAULT_TENANT");
                None
            }
        });
        let webhook_config = WebhookConfig {
            status_url: config.status_url.clone(),
            default_tenant,
        };

        let notifier = Notifier::new(db.clone(), tickets, NotifierConfig::from_config(config));
        Ok(Self::new(
            ApiConfig::from_config(config),
            db,
            notifier,
            telegram,
            webhook_config,
        )
        .with_database_name(database))
    }

    /// Bot client, or a misconfiguration error.
    pub fn telegram(&self) -> Result<&TelegramClient> {
        self.telegram
            .as_ref()
            .ok_or_else(|| ApiError::ServerMisconfigured("TELEGRAM_BOT_TOKEN is not set".to_string()))
    }
}
