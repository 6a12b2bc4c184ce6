//! Client configuration delivery.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};

use queuebell_core::FirebaseClientConfig;

use crate::auth::{tenant_hint, TenantQuery};
use crate::state::AppState;
use crate::types::EnvResponse;

/// GET /api/env - Public configuration for the web client.
pub async fn env_config(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
) -> Json<EnvResponse> {
    let tenant = tenant_hint(&query, &headers).or_else(|| state.config.default_tenant.clone());
    Json(EnvResponse {
        ok: true,
        tenant,
        firebase: state.config.firebase_client.clone(),
        bot_username: state.config.bot_username.clone(),
        telegram_enabled: state.telegram.is_some(),
    })
}

/// GET /api/get-firebase-config - Firebase web SDK options only.
pub async fn firebase_config(State(state): State<AppState>) -> Json<FirebaseClientConfig> {
    Json(state.config.firebase_client.clone())
}
