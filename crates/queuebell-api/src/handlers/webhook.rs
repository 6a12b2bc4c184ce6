//! Telegram webhook endpoint.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use tracing::{error, warn};

use queuebell_models::Slug;
use queuebell_telegram::WebhookOutcome;

use crate::auth::{check_webhook_secret, tenant_hint, TenantQuery};
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// POST /api/telegramWebhook - Handle one bot update.
///
/// Token problems are answered in the chat and still return 200 so
/// Telegram does not redeliver the update.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    Json(update): Json<Value>,
) -> Result<Json<WebhookOutcome>> {
    check_webhook_secret(&state.config, &headers)?;
    let webhook = state
        .webhook
        .as_ref()
        .ok_or_else(|| ApiError::ServerMisconfigured("TELEGRAM_BOT_TOKEN is not set".to_string()))?;

    let hint = tenant_hint(&query, &headers).and_then(|raw| match Slug::parse(&raw) {
        Ok(slug) => Some(slug),
        Err(e) => {
            warn!(error = %e, "Ignoring invalid tenant hint on webhook");
            None
        }
    });

    match webhook.handle(&update, hint).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            error!(error = %e, "Webhook update failed");
            Err(ApiError::Internal("failed to handle update".to_string()))
        }
    }
}
