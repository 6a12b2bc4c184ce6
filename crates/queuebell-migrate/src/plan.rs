//! Planning and applying tenant migrations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use queuebell_models::Slug;
use queuebell_persistence::{validate_path, RealtimeDb, TenantPatch, TenantStore};

use crate::error::{MigrateError, Result};

/// Top-level nodes of the single-tenant layout.
pub const LEGACY_NODES: [&str; 6] = [
    "settings",
    "counters",
    "queue",
    "telegramTokens",
    "announcement",
    "analytics",
];

/// One tenant to migrate and where its legacy data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTarget {
    pub slug: Slug,
    /// Path of the legacy root; empty for the database root.
    pub source: String,
}

impl MigrationTarget {
    pub fn new(slug: &str, source: &str) -> Result<Self> {
        let source = source.trim().trim_matches('/').to_string();
        validate_path(&source)?;
        Ok(Self {
            slug: Slug::parse(slug)?,
            source,
        })
    }

    fn node_path(&self, node: &str) -> String {
        if self.source.is_empty() {
            node.to_string()
        } else {
            format!("{}/{}", self.source, node)
        }
    }
}

/// What happens to one legacy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Copied into the tenant.
    Copy,
    /// Nothing at the legacy path.
    Missing,
    /// The tenant already has this node; it is left alone.
    Exists,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeStatus::Copy => "copy",
            NodeStatus::Missing => "missing",
            NodeStatus::Exists => "exists",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodePlan {
    pub node: &'static str,
    pub status: NodeStatus,
    /// Direct children of the copied node.
    pub children: usize,
}

/// Everything that will be written for one tenant.
#[derive(Debug)]
pub struct TenantPlan {
    pub target: MigrationTarget,
    pub nodes: Vec<NodePlan>,
    pub patch: TenantPatch,
}

impl TenantPlan {
    /// Nodes that will be copied.
    pub fn copies(&self) -> usize {
        self.nodes.iter().filter(|n| n.status == NodeStatus::Copy).count()
    }
}

/// Reads a map file: a JSON object of `slug -> legacy source path`.
pub fn load_map(path: &Path) -> Result<Vec<MigrationTarget>> {
    let raw = std::fs::read_to_string(path).map_err(|source| MigrateError::MapRead {
        path: path.to_path_buf(),
        source,
    })?;
    let format_error = |reason: String| MigrateError::MapFormat {
        path: path.to_path_buf(),
        reason,
    };
    let entries: BTreeMap<String, Value> =
        serde_json::from_str(&raw).map_err(|e| format_error(e.to_string()))?;
    if entries.is_empty() {
        return Err(format_error("no tenants listed".to_string()));
    }

    entries
        .iter()
        .map(|(slug, source)| match source {
            Value::String(source) => MigrationTarget::new(slug, source),
            Value::Null => MigrationTarget::new(slug, ""),
            other => Err(format_error(format!("source for {slug} must be a string, got {other}"))),
        })
        .collect()
}

fn children(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

/// Reads the legacy nodes and stages one patch for the tenant.
pub async fn plan_tenant(db: &Arc<dyn RealtimeDb>, target: &MigrationTarget) -> Result<TenantPlan> {
    let store = TenantStore::new(db.clone(), target.slug.clone());
    let mut nodes = Vec::with_capacity(LEGACY_NODES.len());
    let mut patch = TenantPatch::new();

    for node in LEGACY_NODES {
        let legacy = db.get(&target.node_path(node)).await?;
        let Some(value) = legacy else {
            nodes.push(NodePlan {
                node,
                status: NodeStatus::Missing,
                children: 0,
            });
            continue;
        };
        let children = children(&value);
        if store.get(node).await?.is_some() {
            debug!(tenant = %target.slug, node, "Tenant already has node, skipping");
            nodes.push(NodePlan {
                node,
                status: NodeStatus::Exists,
                children,
            });
            continue;
        }
        patch.set(node, value);
        nodes.push(NodePlan {
            node,
            status: NodeStatus::Copy,
            children,
        });
    }

    Ok(TenantPlan {
        target: target.clone(),
        nodes,
        patch,
    })
}

/// Writes a plan in a single patch. Returns the number of nodes copied.
pub async fn apply(db: &Arc<dyn RealtimeDb>, plan: TenantPlan) -> Result<usize> {
    let copies = plan.copies();
    let store = TenantStore::new(db.clone(), plan.target.slug.clone());
    store.patch(plan.patch).await?;
    info!(tenant = %plan.target.slug, nodes = copies, "Tenant migrated");
    Ok(copies)
}

/// Plans every target, then applies them unless `dry_run`.
///
/// All plans are built before anything is written, so a read failure
/// leaves the database untouched.
pub async fn run(
    db: &Arc<dyn RealtimeDb>,
    targets: &[MigrationTarget],
    dry_run: bool,
) -> Result<Vec<(MigrationTarget, Vec<NodePlan>)>> {
    let mut plans = Vec::with_capacity(targets.len());
    for target in targets {
        plans.push(plan_tenant(db, target).await?);
    }

    let mut report = Vec::with_capacity(plans.len());
    for plan in plans {
        let summary = (plan.target.clone(), plan.nodes.clone());
        if dry_run {
            info!(tenant = %plan.target.slug, nodes = plan.copies(), "Dry run, nothing written");
        } else {
            apply(db, plan).await?;
        }
        report.push(summary);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuebell_persistence::MemoryDb;
    use serde_json::json;
    use std::io::Write;

    fn legacy_db() -> Arc<MemoryDb> {
        Arc::new(MemoryDb::with_data(json!({
            "settings": {"privacy": {"scrubLinkedNumbers": false}},
            "counters": {"c1": {"name": "Counter 1", "prefix": "A", "nowServing": 3, "lastIssued": 5}},
            "queue": {"-Oa1": {"number": "A004", "status": "waiting"}, "-Oa2": {"number": "A005", "status": "waiting"}},
            "analytics": {"servedCount": 12},
            "old": {"settings": {"locale": "fr"}}
        })))
    }

    fn dyn_db(db: &Arc<MemoryDb>) -> Arc<dyn RealtimeDb> {
        db.clone()
    }

    #[test]
    fn test_target_validation() {
        let target = MigrationTarget::new("Cafe", "/legacy/root/").unwrap();
        assert_eq!(target.slug.as_str(), "cafe");
        assert_eq!(target.source, "legacy/root");
        assert_eq!(target.node_path("queue"), "legacy/root/queue");

        assert!(MigrationTarget::new("-bad-", "").is_err());
        assert!(MigrationTarget::new("cafe", "a/../b").is_err());
    }

    #[tokio::test]
    async fn test_plan_and_apply_single_patch() {
        let db = legacy_db();
        let target = MigrationTarget::new("cafe", "").unwrap();

        let report = run(&dyn_db(&db), &[target], false).await.unwrap();
        let (_, nodes) = &report[0];
        let statuses: Vec<_> = nodes.iter().map(|n| (n.node, n.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("settings", NodeStatus::Copy),
                ("counters", NodeStatus::Copy),
                ("queue", NodeStatus::Copy),
                ("telegramTokens", NodeStatus::Missing),
                ("announcement", NodeStatus::Missing),
                ("analytics", NodeStatus::Copy),
            ]
        );
        assert_eq!(nodes[2].children, 2);
        assert_eq!(db.patch_count(), 1);

        let tenant = db.get("tenants/cafe").await.unwrap().unwrap();
        assert_eq!(tenant["counters"]["c1"]["lastIssued"], 5);
        assert_eq!(tenant["analytics"]["servedCount"], 12);
        // Source stays in place.
        assert!(db.get("queue/-Oa1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_existing_tenant_nodes_are_kept() {
        let db = legacy_db();
        db.set("tenants/cafe/settings", json!({"locale": "de"})).await.unwrap();
        let target = MigrationTarget::new("cafe", "").unwrap();

        let plan = plan_tenant(&dyn_db(&db), &target).await.unwrap();
        assert_eq!(plan.nodes[0].status, NodeStatus::Exists);
        apply(&dyn_db(&db), plan).await.unwrap();

        assert_eq!(
            db.get("tenants/cafe/settings").await.unwrap(),
            Some(json!({"locale": "de"}))
        );
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let db = legacy_db();
        let target = MigrationTarget::new("cafe", "old").unwrap();

        let report = run(&dyn_db(&db), &[target], true).await.unwrap();
        assert_eq!(report[0].1[0].status, NodeStatus::Copy);
        assert_eq!(db.patch_count(), 0);
        assert!(db.get("tenants").await.unwrap().is_none());
    }

    #[test]
    fn test_load_map() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cafe": "", "bakery": "legacy/bakery", "deli": null}}"#).unwrap();

        let targets = load_map(file.path()).unwrap();
        let slugs: Vec<_> = targets.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["bakery", "cafe", "deli"]);
        assert_eq!(targets[0].source, "legacy/bakery");
    }

    #[test]
    fn test_load_map_rejects_bad_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cafe": 3}}"#).unwrap();
        assert!(matches!(load_map(file.path()), Err(MigrateError::MapFormat { .. })));

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, "{{}}").unwrap();
        assert!(matches!(load_map(empty.path()), Err(MigrateError::MapFormat { .. })));

        assert!(matches!(
            load_map(Path::new("/nonexistent/map.json")),
            Err(MigrateError::MapRead { .. })
        ));
    }
}
