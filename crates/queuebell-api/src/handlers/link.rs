//! Start-token minting for Telegram deep links.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use queuebell_models::{random_token, StartTokenRecord};
use queuebell_telegram::{deep_link, tenant_start_param};

use super::{body, tenant_store};
use crate::auth::{resolve_tenant, tenant_hint, TenantQuery};
use crate::error::{ApiError, Result};
use crate::state::AppState;
use crate::types::{CreateLinkRequest, LinkResponse};

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// POST /api/createTelegramLink - Mint a start token for a queue entry.
pub async fn create_telegram_link(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>> {
    let req = body(payload)?;
    let hint = tenant_hint(&query, &headers);
    let slug = resolve_tenant(&state.config, req.tenant.as_deref(), hint.as_deref())?;

    let queue_id = trimmed(&req.queue_id);
    let queue_key = match (trimmed(&req.queue_key), queue_id) {
        (Some(key), _) => key.to_string(),
        (None, Some(id)) => id.to_string(),
        (None, None) => {
            return Err(ApiError::InvalidInput(
                "queueKey or queueId is required".to_string(),
            ))
        }
    };

    let bot = state
        .config
        .bot_username
        .as_deref()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::ServerMisconfigured("TELEGRAM_BOT_USERNAME is not set".to_string()))?;

    let store = tenant_store(&state, &slug);
    let queue_key = if store.get(&format!("queue/{queue_key}")).await?.is_some() {
        queue_key
    } else {
        // A bare queueId may be the display number rather than the record key.
        let id = queue_id.ok_or_else(|| ApiError::NotFound(format!("queue entry not found: {queue_key}")))?;
        let matches = store.query_by_index("queue", "queueId", &json!(id)).await?;
        matches
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("queue entry not found: {id}")))?
    };

    let now = Utc::now();
    let token = random_token();
    let mut record = StartTokenRecord::new(queue_key.clone(), now);
    record.queue_id = queue_id.map(str::to_string);
    record.counter_id = req.counter_id;
    record.counter_name = req.counter_name;
    record.tenant = Some(slug.to_string());
    record.meta = req.meta;

    let link = deep_link(bot, &tenant_start_param(&slug, &token))?;
    let value = serde_json::to_value(&record).map_err(|e| ApiError::Internal(e.to_string()))?;
    store.set(&format!("telegramTokens/{token}"), value).await?;
    info!(tenant = %slug, queue_key = %queue_key, "Start token minted");

    Ok(Json(LinkResponse {
        ok: true,
        link,
        token,
        created_at: now,
        expires_at: record.expires_at.unwrap_or(now),
        tenant: Some(slug.to_string()),
    }))
}
