//! String-keyed KV backends for the shared ticket store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{PersistenceError, Result};

/// Minimal KV surface the ticket store needs.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
}

/// In-process KV. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set`/`del` calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Redis-over-REST client: each command is a JSON array POSTed to the base
/// URL with a bearer token, answered by `{"result": …}` or `{"error": …}`.
#[derive(Debug, Clone)]
pub struct RestKv {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RestKv {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn command(&self, args: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, "kv command answered");

        let reply: Option<RestReply> = serde_json::from_str(&body).ok();
        match reply {
            Some(RestReply {
                error: Some(error), ..
            }) => Err(PersistenceError::Upstream {
                status: status.as_u16(),
                body: error,
            }),
            Some(reply) if status.is_success() => Ok(reply.result),
            _ => Err(PersistenceError::Upstream {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl KvBackend for RestKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.command(json!(["GET", key])).await? {
            Value::String(s) => Ok(Some(s)),
            Value::Null => Ok(None),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.command(json!(["SET", key, value])).await.map(|_| ())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.command(json!(["DEL", key])).await.map(|_| ())
    }
}
