//! Broadcast to a tenant's subscribers.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use queuebell_persistence::TenantPatch;
use queuebell_telegram::{html_escape, notify_keyboard};

use super::{body, tenant_store};
use crate::auth::{require_master_key, resolve_tenant, tenant_hint, TenantQuery};
use crate::error::{ApiError, Result};
use crate::state::AppState;
use crate::types::{AnnounceRequest, AnnounceResponse, AnnounceResult};

/// POST /api/announce - Send a message to every subscribed chat.
///
/// Chats that blocked the bot are unsubscribed in the same patch that
/// records `announcement/last`.
pub async fn announce(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    payload: std::result::Result<Json<AnnounceRequest>, JsonRejection>,
) -> Result<Json<AnnounceResponse>> {
    if state.config.announce_requires_key {
        require_master_key(&state.config, &headers)?;
    }
    let req = body(payload)?;
    let hint = tenant_hint(&query, &headers);
    let slug = resolve_tenant(&state.config, req.tenant.as_deref(), hint.as_deref())?;

    let text = req.text.as_deref().map(str::trim).unwrap_or_default();
    let photo = req.photo_url.as_deref().map(str::trim).filter(|p| !p.is_empty());
    if text.is_empty() && photo.is_none() {
        return Err(ApiError::InvalidInput("text or photoUrl is required".to_string()));
    }
    let client = state.telegram()?;

    let store = tenant_store(&state, &slug);
    let chat_ids: Vec<String> = store
        .get("announcement/chatIds")
        .await?
        .and_then(|v| v.as_object().map(|m| m.keys().cloned().collect()))
        .unwrap_or_default();

    let keyboard = notify_keyboard(None, &req.inline_buttons);
    let escaped = html_escape(text);
    let mut results = Vec::with_capacity(chat_ids.len());
    let mut removed = Vec::new();
    for (i, chat_id) in chat_ids.iter().enumerate() {
        if i > 0 {
            sleep(state.send_pause).await;
        }
        let outcome = match photo {
            Some(url) => client.send_photo(chat_id, url, &escaped, keyboard.as_ref()).await,
            None => client.send_message(chat_id, &escaped, keyboard.as_ref()).await,
        };
        if outcome.blocked {
            removed.push(chat_id.clone());
        } else if !outcome.ok {
            warn!(tenant = %slug, chat_id = %chat_id, error = ?outcome.error, "Announcement not delivered");
        }
        results.push(AnnounceResult {
            chat_id: chat_id.clone(),
            send_res: outcome,
        });
    }
    let delivered = results.iter().filter(|r| r.send_res.ok).count();

    let mut patch = TenantPatch::new();
    for chat_id in &removed {
        patch.remove(format!("announcement/chatIds/{chat_id}"));
    }
    patch.set(
        "announcement/last",
        json!({
            "text": text,
            "photoUrl": photo,
            "sentAt": Utc::now().timestamp_millis(),
            "recipients": chat_ids.len(),
            "delivered": delivered,
        }),
    );
    store.patch(patch).await?;

    info!(
        tenant = %slug,
        recipients = chat_ids.len(),
        delivered,
        removed = removed.len(),
        "Announcement sent"
    );
    Ok(Json(AnnounceResponse {
        ok: true,
        tenant: slug.to_string(),
        recipients: chat_ids.len(),
        delivered,
        removed,
        results,
    }))
}
