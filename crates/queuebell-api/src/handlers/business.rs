//! Tenant provisioning handlers.

use std::collections::HashSet;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use queuebell_models::{push_id, Counter, Slug, Tenant, TenantLinks, TenantSettings};
use queuebell_persistence::TenantPatch;

use super::{body, tenant_settings, tenant_store};
use crate::auth::{require_master_key, resolve_tenant, tenant_hint, TenantQuery};
use crate::error::{ApiError, Result};
use crate::state::AppState;
use crate::types::{
    BusinessLookup, BusinessResponse, CounterSeed, CreateBusinessRequest, CreatedBusinessResponse,
    UpdateBusinessRequest, UpdatedBusinessResponse,
};

const NAME_INDEX: &str = "tenantIndex/byName";

fn name_index_path(name: &str) -> Option<String> {
    let key = Tenant::name_key(name);
    (!key.is_empty()).then(|| format!("{NAME_INDEX}/{key}"))
}

fn seed_counters(seeds: &[CounterSeed], now_ms: i64) -> Result<Map<String, Value>> {
    let mut counters = Map::new();
    let mut prefixes = HashSet::new();
    let defaults = [CounterSeed {
        name: "Counter 1".to_string(),
        prefix: "A".to_string(),
    }];
    let seeds = if seeds.is_empty() { &defaults[..] } else { seeds };

    for seed in seeds {
        let counter = Counter::new(seed.name.trim(), &seed.prefix)?;
        if !prefixes.insert(counter.prefix.clone()) {
            return Err(ApiError::InvalidInput(format!(
                "duplicate counter prefix: {}",
                counter.prefix
            )));
        }
        counters.insert(push_id(now_ms), serde_json::to_value(&counter).map_err(internal)?);
    }
    Ok(counters)
}

fn internal(err: serde_json::Error) -> ApiError {
    ApiError::Internal(err.to_string())
}

/// POST /api/createBusiness - Reserve a slug and seed the tenant.
pub async fn create_business(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CreateBusinessRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedBusinessResponse>)> {
    require_master_key(&state.config, &headers)?;
    let req = body(payload)?;

    let slug = Slug::parse(&req.slug)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidInput("name is required".to_string()));
    }

    let now = Utc::now();
    let mut tenant = Tenant::new(slug.clone(), name, now);
    tenant.settings = req.settings.unwrap_or_default();
    tenant.links = req.links.unwrap_or_default();
    tenant.created_by = req.created_by;

    let mut seed = serde_json::to_value(&tenant).map_err(internal)?;
    seed["counters"] = Value::Object(seed_counters(&req.counters, now.timestamp_millis())?);
    seed["analytics"] = json!({ "servedCount": 0 });

    let store = tenant_store(&state, &slug);
    let outcome = store.create_if_absent("", seed).await?;
    if !outcome.committed {
        let existing = outcome.existing.unwrap_or(Value::Null);
        return Err(ApiError::Conflict {
            message: format!("tenant already exists: {slug}"),
            existing: json!({
                "slug": slug.as_str(),
                "name": existing.get("name").cloned().unwrap_or(Value::Null),
            }),
        });
    }

    if let Some(path) = name_index_path(name) {
        if let Err(e) = state.db.set(&path, json!(slug.as_str())).await {
            warn!(tenant = %slug, error = %e, "Failed to write name index");
        }
    }
    info!(tenant = %slug, name = %name, "Tenant created");

    tenant.settings = tenant.settings.public_view();
    Ok((
        StatusCode::CREATED,
        Json(CreatedBusinessResponse {
            ok: true,
            slug: slug.to_string(),
            tenant,
        }),
    ))
}

async fn read_business(state: &AppState, slug: &Slug) -> Result<BusinessResponse> {
    let store = tenant_store(state, slug);
    let (settings, name, status, links) = tokio::join!(
        tenant_settings(&store, slug),
        store.get_as::<String>("name"),
        store.get("status"),
        store.get_as::<TenantLinks>("links"),
    );
    let settings: TenantSettings = settings?;
    let pin_required = settings
        .operator_pin
        .as_deref()
        .is_some_and(|p| !p.is_empty());

    Ok(BusinessResponse {
        ok: true,
        slug: slug.to_string(),
        name: name?,
        status: status?,
        settings: settings.public_view(),
        links: links?.unwrap_or_default(),
        pin_required,
    })
}

/// GET /api/getBusiness?slug= - Public tenant settings.
pub async fn get_business(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
) -> Result<Json<BusinessResponse>> {
    let hint = tenant_hint(&query, &headers);
    let slug = resolve_tenant(&state.config, None, hint.as_deref())?;
    Ok(Json(read_business(&state, &slug).await?))
}

/// POST /api/getBusiness - Same as GET, slug in the body.
pub async fn lookup_business(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    payload: std::result::Result<Json<BusinessLookup>, JsonRejection>,
) -> Result<Json<BusinessResponse>> {
    let lookup = body(payload)?;
    let hint = tenant_hint(&query, &headers);
    let named = lookup.slug.as_deref().or(lookup.tenant.as_deref());
    let slug = resolve_tenant(&state.config, named, hint.as_deref())?;
    Ok(Json(read_business(&state, &slug).await?))
}

/// POST /api/updateBusiness - Patch name, status, settings and links.
pub async fn update_business(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<UpdateBusinessRequest>, JsonRejection>,
) -> Result<Json<UpdatedBusinessResponse>> {
    require_master_key(&state.config, &headers)?;
    let req = body(payload)?;
    let slug = Slug::parse(&req.slug)?;
    let store = tenant_store(&state, &slug);
    tenant_settings(&store, &slug).await?;

    let mut patch = TenantPatch::new();
    let mut updated = Vec::new();
    let mut stage = |patch: &mut TenantPatch, path: String, value: Value| {
        updated.push(path.clone());
        patch.set(path, value);
    };

    let mut renamed = None;
    if let Some(name) = req.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(ApiError::InvalidInput("name cannot be empty".to_string()));
        }
        let previous = store.get_as::<String>("name").await?;
        stage(&mut patch, "name".to_string(), json!(name));
        renamed = Some((previous, name.to_string()));
    }
    if let Some(status) = req.status {
        stage(&mut patch, "status".to_string(), json!(status));
    }
    for (key, value) in req.settings.unwrap_or_default() {
        stage(&mut patch, format!("settings/{key}"), value);
    }
    if let Some(links) = req.links {
        let fields = [("status", links.status), ("explore", links.explore), ("site", links.site)];
        for (field, value) in fields {
            if let Some(value) = value {
                stage(&mut patch, format!("links/{field}"), json!(value));
            }
        }
    }
    if patch.is_empty() {
        return Err(ApiError::InvalidInput("nothing to update".to_string()));
    }

    store.patch(patch).await?;

    if let Some((previous, name)) = renamed {
        let old_path = previous.as_deref().and_then(name_index_path);
        let new_path = name_index_path(&name);
        if old_path != new_path {
            if let Some(path) = old_path {
                if let Err(e) = state.db.set(&path, Value::Null).await {
                    warn!(tenant = %slug, error = %e, "Failed to clear old name index");
                }
            }
            if let Some(path) = new_path {
                if let Err(e) = state.db.set(&path, json!(slug.as_str())).await {
                    warn!(tenant = %slug, error = %e, "Failed to write name index");
                }
            }
        }
    }
    info!(tenant = %slug, fields = updated.len(), "Tenant updated");

    Ok(Json(UpdatedBusinessResponse {
        ok: true,
        slug: slug.to_string(),
        updated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_index_path() {
        assert_eq!(
            name_index_path("Joe's Cafe").as_deref(),
            Some("tenantIndex/byName/joe-s-cafe")
        );
        assert_eq!(name_index_path("  ***  "), None);
    }

    #[test]
    fn test_seed_counters_default_and_duplicates() {
        let counters = seed_counters(&[], 1_700_000_000_000).unwrap();
        assert_eq!(counters.len(), 1);
        let counter = counters.values().next().unwrap();
        assert_eq!(counter["prefix"], "A");
        assert_eq!(counter["name"], "Counter 1");

        let dupes = [
            CounterSeed {
                name: "Desk 1".into(),
                prefix: "a".into(),
            },
            CounterSeed {
                name: "Desk 2".into(),
                prefix: "A".into(),
            },
        ];
        assert!(matches!(
            seed_counters(&dupes, 1_700_000_000_000),
            Err(ApiError::InvalidInput(_))
        ));
    }
}
