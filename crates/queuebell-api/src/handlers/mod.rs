//! HTTP request handlers.

mod announce;
mod business;
mod counters;
mod env;
mod health;
mod link;
mod notify;
mod pin;
mod webhook;

pub use announce::*;
pub use business::*;
pub use counters::*;
pub use env::*;
pub use health::*;
pub use link::*;
pub use notify::*;
pub use pin::*;
pub use webhook::*;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use queuebell_models::{Slug, TenantSettings};
use queuebell_persistence::TenantStore;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Unwraps a JSON body, turning rejections into `invalid_input`.
pub(crate) fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    let Json(value) = payload?;
    Ok(value)
}

pub(crate) fn tenant_store(state: &AppState, slug: &Slug) -> TenantStore {
    TenantStore::new(state.db.clone(), slug.clone())
}

/// Settings of an existing tenant. Every provisioned tenant has a settings node.
pub(crate) async fn tenant_settings(store: &TenantStore, slug: &Slug) -> Result<TenantSettings> {
    store
        .get_as::<TenantSettings>("settings")
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown tenant: {slug}")))
}
