//! Operator PIN gate.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};

use super::{body, tenant_settings, tenant_store};
use crate::auth::{check_pin, presented_pin, resolve_tenant, tenant_hint, TenantQuery};
use crate::error::Result;
use crate::state::AppState;
use crate::types::{PinResponse, VerifyPinRequest};

/// POST /api/verifyPin - Check an operator PIN.
///
/// Tenants without a PIN always pass with `required: false`.
pub async fn verify_pin(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    payload: std::result::Result<Json<VerifyPinRequest>, JsonRejection>,
) -> Result<Json<PinResponse>> {
    let req = body(payload)?;
    let hint = tenant_hint(&query, &headers);
    let slug = resolve_tenant(&state.config, req.tenant.as_deref(), hint.as_deref())?;
    let settings = tenant_settings(&tenant_store(&state, &slug), &slug).await?;

    let expected = settings.operator_pin.as_deref().filter(|p| !p.is_empty());
    check_pin(expected, presented_pin(req.pin.as_deref(), &headers))?;
    Ok(Json(PinResponse {
        ok: true,
        required: expected.is_some(),
    }))
}
