//! Tenant (business) records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::Slug;

/// Operational status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Active,
    Suspended,
}

/// Privacy policy applied by the call pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacySettings {
    /// Remove number fields from served queue records once a chat is linked.
    pub scrub_linked_numbers: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            scrub_linked_numbers: true,
        }
    }
}

/// Tenant settings stored at `tenants/{slug}/settings`.
///
/// Unknown keys written by the console are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Display copy shown on the customer page (headline, welcome text, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub display: BTreeMap<String, String>,
    pub privacy: PrivacySettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_pin: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TenantSettings {
    /// Settings without secrets, for unauthenticated readers.
    pub fn public_view(&self) -> Self {
        Self {
            operator_pin: None,
            ..self.clone()
        }
    }
}

/// Public links of a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantLinks {
    /// Customer status page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// "Explore" call-to-action shown under notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explore: Option<String>,
    /// Static site, when one was scaffolded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

/// A business using QueueBell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub slug: Slug,
    pub name: String,
    #[serde(default)]
    pub settings: TenantSettings,
    #[serde(default)]
    pub status: TenantStatus,
    #[serde(default)]
    pub links: TenantLinks,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Tenant {
    /// Creates an active tenant.
    pub fn new(slug: Slug, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            slug,
            name: name.into(),
            settings: TenantSettings::default(),
            status: TenantStatus::Active,
            links: TenantLinks::default(),
            created_at,
            created_by: None,
        }
    }

    /// Key used in the global name index (lowercase, alphanumerics and '-').
    pub fn name_key(name: &str) -> String {
        let mut key = String::new();
        for c in name.trim().to_lowercase().chars() {
            if c.is_ascii_alphanumeric() {
                key.push(c);
            } else if !key.ends_with('-') && !key.is_empty() {
                key.push('-');
            }
        }
        key.trim_end_matches('-').to_string()
    }
}
