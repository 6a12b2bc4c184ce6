//! Operator counter actions.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use queuebell_models::{format_number, push_id, Counter, Slug};
use queuebell_notifier::NotifyRequest;
use queuebell_persistence::{TenantPatch, TenantStore};

use super::{body, tenant_settings, tenant_store};
use crate::auth::{check_pin, presented_pin, resolve_tenant, tenant_hint, TenantQuery};
use crate::error::{ApiError, Result};
use crate::state::AppState;
use crate::types::{CounterActionRequest, CounterResponse};

/// Actions accepted on `/api/counters/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    Create,
    Issue,
    CallNext,
    Skip,
    Reset,
    SetPrefix,
    Remove,
}

impl CounterAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(Self::Create),
            "issue" => Some(Self::Issue),
            "callNext" | "call-next" => Some(Self::CallNext),
            "skip" => Some(Self::Skip),
            "reset" => Some(Self::Reset),
            "setPrefix" | "set-prefix" => Some(Self::SetPrefix),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Issue => "issue",
            Self::CallNext => "callNext",
            Self::Skip => "skip",
            Self::Reset => "reset",
            Self::SetPrefix => "setPrefix",
            Self::Remove => "remove",
        }
    }
}

fn parse_counters(raw: Option<Value>) -> Map<String, Value> {
    match raw {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn load_counter(counters: &Map<String, Value>, id: &str) -> Result<Counter> {
    let value = counters
        .get(id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("counter not found: {id}")))?;
    serde_json::from_value(value)
        .map_err(|e| ApiError::Internal(format!("counter {id} is malformed: {e}")))
}

/// Rejects `prefix` when another counter of the tenant already uses it.
fn ensure_prefix_free(counters: &Map<String, Value>, prefix: &str, own_id: Option<&str>) -> Result<()> {
    let taken = counters.iter().find(|(id, value)| {
        Some(id.as_str()) != own_id
            && value
                .get("prefix")
                .and_then(Value::as_str)
                .is_some_and(|p| p.eq_ignore_ascii_case(prefix))
    });
    match taken {
        Some((id, value)) => Err(ApiError::Conflict {
            message: format!("prefix {prefix} is already used"),
            existing: json!({ "counterId": id, "counter": value }),
        }),
        None => Ok(()),
    }
}

fn counter_id(req: &CounterActionRequest) -> Result<String> {
    req.counter_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::InvalidInput("counterId is required".to_string()))
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidInput(format!("{field} is required")))
}

/// Result of applying one action to the tenant's counters.
struct Applied {
    id: String,
    counter: Option<Counter>,
    number: Option<String>,
    patch: TenantPatch,
}

fn apply(
    action: CounterAction,
    req: &CounterActionRequest,
    counters: &Map<String, Value>,
    now_ms: i64,
) -> Result<Applied> {
    let mut patch = TenantPatch::new();

    if action == CounterAction::Create {
        let name = required(&req.name, "name")?;
        let counter = Counter::new(name, required(&req.prefix, "prefix")?)?;
        ensure_prefix_free(counters, &counter.prefix, None)?;
        let id = push_id(now_ms);
        patch.set(
            format!("counters/{id}"),
            serde_json::to_value(&counter).map_err(|e| ApiError::Internal(e.to_string()))?,
        );
        return Ok(Applied {
            id,
            counter: Some(counter),
            number: None,
            patch,
        });
    }

    let id = counter_id(req)?;
    let mut counter = load_counter(counters, &id)?;
    let base = format!("counters/{id}");
    let number = match action {
        CounterAction::Create => None,
        CounterAction::Issue => {
            let position = counter.issue()?;
            patch.set(format!("{base}/lastIssued"), counter.last_issued);
            Some(format_number(&counter.prefix, position))
        }
        CounterAction::CallNext | CounterAction::Skip => {
            if action == CounterAction::CallNext {
                counter.call_next()?;
            } else {
                counter.skip()?;
            }
            patch.set(format!("{base}/nowServing"), counter.now_serving);
            counter.called_full()
        }
        CounterAction::Reset => {
            counter.reset(req.base.unwrap_or(0));
            patch
                .set(format!("{base}/nowServing"), counter.now_serving)
                .set(format!("{base}/lastIssued"), counter.last_issued);
            None
        }
        CounterAction::SetPrefix => {
            counter.set_prefix(required(&req.prefix, "prefix")?)?;
            ensure_prefix_free(counters, &counter.prefix, Some(&id))?;
            patch.set(format!("{base}/prefix"), counter.prefix.clone());
            None
        }
        CounterAction::Remove => {
            patch.remove(base);
            return Ok(Applied {
                id,
                counter: None,
                number: None,
                patch,
            });
        }
    };

    Ok(Applied {
        id,
        counter: Some(counter),
        number,
        patch,
    })
}

async fn authorize(store: &TenantStore, slug: &Slug, req: &CounterActionRequest, headers: &HeaderMap) -> Result<()> {
    let settings = tenant_settings(store, slug).await?;
    check_pin(
        settings.operator_pin.as_deref(),
        presented_pin(req.pin.as_deref(), headers),
    )
}

/// POST /api/counters/:action - Apply an operator action to a counter.
pub async fn counter_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CounterActionRequest>, JsonRejection>,
) -> Result<Json<CounterResponse>> {
    let action = CounterAction::parse(&action)
        .ok_or_else(|| ApiError::NotFound(format!("unknown counter action: {action}")))?;
    let req = body(payload)?;
    let hint = tenant_hint(&query, &headers);
    let slug = resolve_tenant(&state.config, req.tenant.as_deref(), hint.as_deref())?;
    let store = tenant_store(&state, &slug);

    authorize(&store, &slug, &req, &headers).await?;
    let counters = parse_counters(store.get("counters").await?);
    let applied = apply(action, &req, &counters, Utc::now().timestamp_millis())?;
    store.patch(applied.patch).await?;
    info!(
        tenant = %slug,
        counter_id = %applied.id,
        action = action.as_str(),
        number = ?applied.number,
        "Counter updated"
    );

    let mut notify = None;
    if action == CounterAction::CallNext && req.notify {
        if let (Some(counter), Some(called)) = (&applied.counter, &applied.number) {
            let request = NotifyRequest {
                tenant: Some(slug.to_string()),
                called_full: Some(called.clone()),
                counter_name: Some(counter.name.clone()),
                ..NotifyRequest::default()
            };
            match state.notifier.notify(request, None).await {
                Ok(response) => notify = Some(response),
                // The counter already moved; report the failure without undoing it.
                Err(e) => warn!(tenant = %slug, error = %e, "Notify after callNext failed"),
            }
        }
    }

    Ok(Json(CounterResponse {
        ok: true,
        action: action.as_str().to_string(),
        counter_id: applied.id,
        counter: applied.counter,
        number: applied.number,
        notify,
    }))
}
