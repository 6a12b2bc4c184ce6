//! Request DTOs for the API.

use serde::Deserialize;
use serde_json::{Map, Value};

use queuebell_models::queue::string_or_number;
use queuebell_models::{TenantLinks, TenantSettings, TenantStatus};
use queuebell_telegram::ButtonSpec;

/// Counter created together with a tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct CounterSeed {
    pub name: String,
    pub prefix: String,
}

/// Create business request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusinessRequest {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub settings: Option<TenantSettings>,
    #[serde(default)]
    pub links: Option<TenantLinks>,
    #[serde(default)]
    pub created_by: Option<String>,
    /// Counters to seed; one "Counter 1" with prefix "A" when empty.
    #[serde(default)]
    pub counters: Vec<CounterSeed>,
}

/// Body form of `getBusiness`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusinessLookup {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
}

/// Update business request. `settings` is merged key by key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBusinessRequest {
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<TenantStatus>,
    #[serde(default)]
    pub settings: Option<Map<String, Value>>,
    #[serde(default)]
    pub links: Option<TenantLinks>,
}

/// Create Telegram link request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub queue_key: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub queue_id: Option<String>,
    #[serde(default)]
    pub counter_id: Option<String>,
    #[serde(default)]
    pub counter_name: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Broadcast request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceRequest {
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default, alias = "message")]
    pub text: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub inline_buttons: Vec<Vec<ButtonSpec>>,
}

/// Operator counter action.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterActionRequest {
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default, alias = "id")]
    pub counter_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub pin: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub base: Option<u32>,
    /// Run the call pipeline after `callNext`.
    #[serde(default)]
    pub notify: bool,
}

/// PIN check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPinRequest {
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub pin: Option<String>,
}
