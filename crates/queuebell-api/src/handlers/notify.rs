//! Call pipeline handler.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use queuebell_notifier::{NotifyRequest, NotifyResponse};

use super::body;
use crate::auth::{tenant_hint, TenantQuery};
use crate::error::Result;
use crate::state::AppState;

/// POST /api/notifyCounter - Notify customers about a called number.
pub async fn notify_counter(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    payload: std::result::Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<NotifyResponse>> {
    let request = body(payload)?;
    let hint = tenant_hint(&query, &headers).or_else(|| state.config.default_tenant.clone());
    let response = state.notifier.notify(request, hint.as_deref()).await?;
    info!(
        tenant = %response.tenant,
        called = %response.called_full,
        sent = response.sent,
        "Counter notified"
    );
    Ok(Json(response))
}
