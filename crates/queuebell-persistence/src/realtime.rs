//! Hierarchical realtime database access.
//!
//! The database is a JSON tree addressed by slash-separated paths. Writing
//! `null` deletes a node, and empty objects are never stored.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{PersistenceError, Result};

/// Result of a create-if-absent write.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    /// True when this call created the node.
    pub committed: bool,
    /// The node found in place when nothing was committed.
    pub existing: Option<Value>,
}

/// The operations QueueBell needs from the realtime database.
#[async_trait]
pub trait RealtimeDb: Send + Sync {
    /// Reads a node. Missing nodes are `None`.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replaces a node. `Value::Null` deletes it.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Multi-path update: every key of `updates` is a path relative to `path`
    /// and is replaced wholesale. Applied atomically in one round-trip.
    async fn patch(&self, path: &str, updates: Map<String, Value>) -> Result<()>;

    /// Writes `value` only if nothing exists at `path`.
    async fn create_if_absent(&self, path: &str, value: Value) -> Result<CreateOutcome>;

    /// Children of `path` whose `child` field equals `equals`.
    async fn query_by_child(&self, path: &str, child: &str, equals: &Value)
        -> Result<Map<String, Value>>;
}

/// Rejects empty, `.`/`..` segments and the characters `. $ # [ ]`.
///
/// The empty string is accepted and addresses the root of a scope.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    let bad = path.split('/').any(|segment| {
        segment.is_empty()
            || segment.chars().any(|c| matches!(c, '.' | '$' | '#' | '[' | ']') || c.is_control())
    });
    if bad {
        return Err(PersistenceError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Joins two already-validated paths.
pub(crate) fn join(base: &str, path: &str) -> String {
    match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{path}"),
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Drops nulls and empty objects, as the hosted database does.
fn compact(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, compact(v)))
                .filter(|(_, v)| !is_empty_node(v))
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

/// Direct children of `entries` whose `child` field equals `equals`.
fn children_matching(entries: &Map<String, Value>, child: &str, equals: &Value) -> Map<String, Value> {
    entries
        .iter()
        .filter(|(_, entry)| entry.get(child) == Some(equals))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn is_empty_node(value: &Value) -> bool {
    value.is_null() || value.as_object().is_some_and(Map::is_empty)
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments(path) {
        node = node.as_object()?.get(segment)?;
    }
    (!node.is_null()).then_some(node)
}

fn write_at(node: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    if rest.is_empty() {
        if value.is_null() {
            map.remove(*head);
        } else {
            map.insert(head.to_string(), value);
        }
        return;
    }
    let child = map.entry(head.to_string()).or_insert(Value::Null);
    write_at(child, rest, value);
    if is_empty_node(child) {
        map.remove(*head);
    }
}

/// In-memory JSON tree used by tests and local development.
#[derive(Debug, Default)]
pub struct MemoryDb {
    root: RwLock<Value>,
    patches: AtomicUsize,
    fail_patches: AtomicBool,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the tree with `root`.
    pub fn with_data(root: Value) -> Self {
        Self {
            root: RwLock::new(compact(root)),
            ..Self::default()
        }
    }

    /// Copy of the whole tree.
    pub async fn snapshot(&self) -> Value {
        self.root.read().await.clone()
    }

    /// Number of successful `patch` calls.
    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    /// Makes every following `patch` fail with a 503 until reset.
    pub fn set_fail_patches(&self, fail: bool) {
        self.fail_patches.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RealtimeDb for MemoryDb {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        validate_path(path)?;
        let root = self.root.read().await;
        Ok(lookup(&root, path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        validate_path(path)?;
        let mut root = self.root.write().await;
        write_at(&mut root, &segments(path), compact(value));
        Ok(())
    }

    async fn patch(&self, path: &str, updates: Map<String, Value>) -> Result<()> {
        validate_path(path)?;
        for key in updates.keys() {
            validate_path(key)?;
        }
        if self.fail_patches.load(Ordering::SeqCst) {
            return Err(PersistenceError::Upstream {
                status: 503,
                body: "patch rejected".to_string(),
            });
        }
        let mut root = self.root.write().await;
        for (key, value) in updates {
            let full = join(path, &key);
            write_at(&mut root, &segments(&full), compact(value));
        }
        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_if_absent(&self, path: &str, value: Value) -> Result<CreateOutcome> {
        validate_path(path)?;
        let mut root = self.root.write().await;
        if let Some(existing) = lookup(&root, path) {
            return Ok(CreateOutcome {
                committed: false,
                existing: Some(existing.clone()),
            });
        }
        write_at(&mut root, &segments(path), compact(value));
        Ok(CreateOutcome {
            committed: true,
            existing: None,
        })
    }

    async fn query_by_child(
        &self,
        path: &str,
        child: &str,
        equals: &Value,
    ) -> Result<Map<String, Value>> {
        validate_path(path)?;
        let root = self.root.read().await;
        Ok(match lookup(&root, path) {
            Some(Value::Object(entries)) => children_matching(entries, child, equals),
            _ => Map::new(),
        })
    }
}

/// Firebase Realtime Database over its REST API.
#[derive(Debug, Clone)]
pub struct FirebaseDb {
    client: reqwest::Client,
    base_url: String,
    secret: Option<String>,
}

impl FirebaseDb {
    /// Creates a client for `base_url` (e.g. `https://acme-default-rtdb.firebaseio.com`).
    pub fn new(base_url: impl Into<String>, secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}.json", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.secret {
            Some(secret) => builder.query(&[("auth", secret)]),
            None => builder,
        }
    }

    async fn read_body(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, "realtime database request failed");
            return Err(PersistenceError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RealtimeDb for FirebaseDb {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        validate_path(path)?;
        let response = self.request(Method::GET, path).send().await?;
        let value = Self::read_body(response).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        validate_path(path)?;
        let builder = if value.is_null() {
            self.request(Method::DELETE, path)
        } else {
            self.request(Method::PUT, path).json(&value)
        };
        Self::read_body(builder.send().await?).await.map(|_| ())
    }

    async fn patch(&self, path: &str, updates: Map<String, Value>) -> Result<()> {
        validate_path(path)?;
        for key in updates.keys() {
            validate_path(key)?;
        }
        debug!(path = %path, keys = updates.len(), "multi-path update");
        let response = self
            .request(Method::PATCH, path)
            .json(&Value::Object(updates))
            .send()
            .await?;
        Self::read_body(response).await.map(|_| ())
    }

    async fn create_if_absent(&self, path: &str, value: Value) -> Result<CreateOutcome> {
        validate_path(path)?;
        let response = self
            .request(Method::GET, path)
            .header("X-Firebase-ETag", "true")
            .send()
            .await?;
        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let current = Self::read_body(response).await?;
        if !current.is_null() {
            return Ok(CreateOutcome {
                committed: false,
                existing: Some(current),
            });
        }
        let Some(etag) = etag else {
            return Err(PersistenceError::Upstream {
                status: 0,
                body: "missing ETag on conditional read".to_string(),
            });
        };

        let response = self
            .request(Method::PUT, path)
            .header("if-match", etag)
            .json(&value)
            .send()
            .await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            let body = response.text().await?;
            let existing = serde_json::from_str::<Value>(&body)
                .ok()
                .filter(|v| !v.is_null());
            return Ok(CreateOutcome {
                committed: false,
                existing,
            });
        }
        Self::read_body(response).await?;
        Ok(CreateOutcome {
            committed: true,
            existing: None,
        })
    }

    async fn query_by_child(
        &self,
        path: &str,
        child: &str,
        equals: &Value,
    ) -> Result<Map<String, Value>> {
        validate_path(path)?;
        let response = self
            .request(Method::GET, path)
            .query(&[
                ("orderBy", format!("\"{child}\"")),
                ("equalTo", equals.to_string()),
            ])
            .send()
            .await?;
        match Self::read_body(response).await {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Ok(Map::new()),
            Err(PersistenceError::Upstream { status: 400, body }) if body.contains("Index not defined") => {
                warn!(path, child, "No database index, filtering a full read");
                Ok(match self.get(path).await? {
                    Some(Value::Object(entries)) => children_matching(&entries, child, equals),
                    _ => Map::new(),
                })
            }
            Err(e) => Err(e),
        }
    }
}
