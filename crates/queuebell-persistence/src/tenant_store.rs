//! Tenant-scoped view of the realtime database.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use queuebell_models::Slug;

use crate::error::{PersistenceError, Result};
use crate::realtime::{join, validate_path, CreateOutcome, RealtimeDb};

/// Where a [`TenantStore`] reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Everything under `tenants/{slug}`.
    Tenant(Slug),
    /// Legacy root-level nodes, read-only.
    Global,
}

impl Scope {
    fn base(&self) -> String {
        match self {
            Scope::Tenant(slug) => format!("tenants/{slug}"),
            Scope::Global => String::new(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Tenant(slug) => write!(f, "tenant:{slug}"),
            Scope::Global => f.write_str("global"),
        }
    }
}

/// Multi-path update staged against a tenant.
///
/// Keys are paths relative to the tenant root. Setting a path twice keeps
/// the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenantPatch {
    updates: Map<String, Value>,
}

impl TenantPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `path = value`.
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.updates.insert(path.into(), value.into());
        self
    }

    /// Stages deletion of `path`.
    pub fn remove(&mut self, path: impl Into<String>) -> &mut Self {
        self.updates.insert(path.into(), Value::Null);
        self
    }

    /// Moves every update of `other` into this patch.
    pub fn merge(&mut self, other: TenantPatch) -> &mut Self {
        self.updates.extend(other.updates);
        self
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.updates.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.updates
    }
}

/// Scoped façade over a [`RealtimeDb`].
///
/// All paths are validated and resolved under the scope root, so a tenant
/// store can never touch another tenant's data.
pub struct TenantStore {
    db: Arc<dyn RealtimeDb>,
    scope: Scope,
    patches: AtomicUsize,
}

impl TenantStore {
    /// Store bound to `tenants/{slug}`.
    pub fn new(db: Arc<dyn RealtimeDb>, slug: Slug) -> Self {
        Self {
            db,
            scope: Scope::Tenant(slug),
            patches: AtomicUsize::new(0),
        }
    }

    /// Read-only store over the legacy root.
    pub fn global(db: Arc<dyn RealtimeDb>) -> Self {
        Self {
            db,
            scope: Scope::Global,
            patches: AtomicUsize::new(0),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The tenant slug, or `None` for the global scope.
    pub fn slug(&self) -> Option<&Slug> {
        match &self.scope {
            Scope::Tenant(slug) => Some(slug),
            Scope::Global => None,
        }
    }

    /// Number of patches this store has applied.
    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    fn resolve(&self, path: &str) -> Result<String> {
        validate_path(path)?;
        Ok(join(&self.scope.base(), path))
    }

    fn writable(&self, path: &str) -> Result<()> {
        match self.scope {
            Scope::Tenant(_) => Ok(()),
            Scope::Global => Err(PersistenceError::ReadOnly(path.to_string())),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Option<Value>> {
        let full = self.resolve(path)?;
        self.db.get(&full).await
    }

    /// Reads and deserializes a node.
    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.writable(path)?;
        let full = self.resolve(path)?;
        self.db.set(&full, value).await
    }

    /// Applies a staged patch in one round-trip. Empty patches are skipped.
    pub async fn patch(&self, patch: TenantPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.writable("")?;
        for key in patch.updates.keys() {
            validate_path(key)?;
        }
        let base = self.resolve("")?;
        debug!(scope = %self.scope, keys = patch.len(), "applying tenant patch");
        self.db.patch(&base, patch.into_map()).await?;
        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub async fn create_if_absent(&self, path: &str, value: Value) -> Result<CreateOutcome> {
        self.writable(path)?;
        let full = self.resolve(path)?;
        self.db.create_if_absent(&full, value).await
    }

    /// Children of `path` whose `key` equals `equals`.
    pub async fn query_by_index(
        &self,
        path: &str,
        key: &str,
        equals: &Value,
    ) -> Result<Map<String, Value>> {
        validate_path(key)?;
        let full = self.resolve(path)?;
        self.db.query_by_child(&full, key, equals).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::MemoryDb;
    use serde_json::json;

    fn acme(db: &Arc<MemoryDb>) -> TenantStore {
        TenantStore::new(db.clone(), Slug::parse("acme").unwrap())
    }

    #[tokio::test]
    async fn test_writes_land_under_tenant_root() {
        let db = Arc::new(MemoryDb::new());
        let store = acme(&db);

        store.set("settings/locale", json!("en")).await.unwrap();

        assert_eq!(
            db.get("tenants/acme/settings/locale").await.unwrap(),
            Some(json!("en"))
        );
        assert!(db.get("settings").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_escape_is_rejected() {
        let db = Arc::new(MemoryDb::new());
        let store = acme(&db);

        let err = store.set("../other/settings", json!(1)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidPath(_)));

        let mut patch = TenantPatch::new();
        patch.set("queue/q1/status", "served").set("queue/../x", 1);
        assert!(store.patch(patch).await.is_err());
        assert_eq!(store.patch_count(), 0);
        assert_eq!(db.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_patch_counts_and_skips_empty() {
        let db = Arc::new(MemoryDb::new());
        let store = acme(&db);

        store.patch(TenantPatch::new()).await.unwrap();
        assert_eq!(store.patch_count(), 0);

        let mut patch = TenantPatch::new();
        patch
            .set("queue/q1/status", "served")
            .set("analytics/servedCount", 1);
        store.patch(patch).await.unwrap();

        assert_eq!(store.patch_count(), 1);
        assert_eq!(
            store.get("analytics/servedCount").await.unwrap(),
            Some(json!(1))
        );
    }

    #[tokio::test]
    async fn test_global_scope_is_read_only() {
        let db = Arc::new(MemoryDb::with_data(json!({
            "telegramTokens": {"tok": {"queueKey": "-Oa1"}}
        })));
        let store = TenantStore::global(db.clone());

        assert_eq!(
            store.get("telegramTokens/tok/queueKey").await.unwrap(),
            Some(json!("-Oa1"))
        );
        assert!(matches!(
            store.set("telegramTokens/tok/used", json!(true)).await,
            Err(PersistenceError::ReadOnly(_))
        ));
        let mut patch = TenantPatch::new();
        patch.set("x", 1);
        assert!(store.patch(patch).await.is_err());
    }

    #[tokio::test]
    async fn test_query_by_index_is_scoped() {
        let db = Arc::new(MemoryDb::with_data(json!({
            "tenants": {
                "acme": {"queue": {"q1": {"chatId": "42"}}},
                "other": {"queue": {"q2": {"chatId": "42"}}}
            }
        })));
        let store = acme(&db);

        let hits = store
            .query_by_index("queue", "chatId", &json!("42"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key("q1"));
    }

    #[test]
    fn test_patch_merge_keeps_last_value() {
        let mut a = TenantPatch::new();
        a.set("queue/q1/status", "called");
        let mut b = TenantPatch::new();
        b.set("queue/q1/status", "served").remove("queue/q1/number");
        a.merge(b);

        assert_eq!(a.len(), 2);
        assert_eq!(a.get("queue/q1/status"), Some(&json!("served")));
        assert_eq!(a.get("queue/q1/number"), Some(&Value::Null));
    }
}
