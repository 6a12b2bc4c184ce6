//! Buffered ticket state and per-series statistics.
//!
//! A ticket store lives for one request. Reads go through a cache, writes
//! are buffered, and `flush` persists everything at once:
//!
//! - [`KvTicketStore`] writes one KV key per ticket/series, in parallel.
//! - [`FileTicketStore`] rewrites a single `{tickets, stats}` document.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use queuebell_core::TicketBackend;
use queuebell_models::{SeriesStats, Ticket};

use crate::atomic::{atomic_write_json, read_json_or_default};
use crate::error::Result;
use crate::kv::{KvBackend, RestKv};

/// Outcome of a flush. Failures are counted, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub backend: &'static str,
    pub tickets_written: usize,
    pub tickets_deleted: usize,
    pub stats_written: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl FlushReport {
    pub fn ok(&self) -> bool {
        self.failed == 0
    }
}

/// Per-request ticket persistence.
#[async_trait]
pub trait TicketStore: Send {
    async fn load_ticket(&mut self, tenant: &str, key: &str) -> Result<Option<Ticket>>;

    /// Buffers an upsert.
    fn put_ticket(&mut self, tenant: &str, ticket: Ticket);

    /// Buffers a removal.
    fn delete_ticket(&mut self, tenant: &str, key: &str);

    /// Stats for a series; missing series start empty.
    async fn load_series_stats(&mut self, tenant: &str, series: &str) -> Result<SeriesStats>;

    /// Buffers a stats replacement.
    fn put_series_stats(&mut self, tenant: &str, series: &str, stats: SeriesStats);

    /// Persists buffered mutations and clears the buffer.
    async fn flush(&mut self) -> FlushReport;
}

fn ticket_key(tenant: &str, key: &str) -> String {
    format!("qb:{tenant}:ticket:{key}")
}

fn stats_key(tenant: &str, series: &str) -> String {
    format!("qb:{tenant}:stats:{series}")
}

/// Ticket store over a shared KV.
pub struct KvTicketStore {
    kv: Arc<dyn KvBackend>,
    tickets: HashMap<String, Option<Ticket>>,
    stats: HashMap<String, SeriesStats>,
    dirty_tickets: Vec<String>,
    dirty_stats: Vec<String>,
}

impl KvTicketStore {
    pub fn new(kv: Arc<dyn KvBackend>) -> Self {
        Self {
            kv,
            tickets: HashMap::new(),
            stats: HashMap::new(),
            dirty_tickets: Vec::new(),
            dirty_stats: Vec::new(),
        }
    }

    fn mark(list: &mut Vec<String>, key: &str) {
        if !list.iter().any(|k| k == key) {
            list.push(key.to_string());
        }
    }
}

#[async_trait]
impl TicketStore for KvTicketStore {
    async fn load_ticket(&mut self, tenant: &str, key: &str) -> Result<Option<Ticket>> {
        let kv_key = ticket_key(tenant, key);
        if let Some(cached) = self.tickets.get(&kv_key) {
            return Ok(cached.clone());
        }
        let ticket = match self.kv.get(&kv_key).await? {
            Some(raw) => match serde_json::from_str::<Ticket>(&raw) {
                Ok(ticket) => Some(ticket),
                Err(e) => {
                    warn!(key = %kv_key, error = %e, "discarding unreadable ticket");
                    None
                }
            },
            None => None,
        };
        self.tickets.insert(kv_key, ticket.clone());
        Ok(ticket)
    }

    fn put_ticket(&mut self, tenant: &str, ticket: Ticket) {
        let kv_key = ticket_key(tenant, &ticket.ticket_key);
        Self::mark(&mut self.dirty_tickets, &kv_key);
        self.tickets.insert(kv_key, Some(ticket));
    }

    fn delete_ticket(&mut self, tenant: &str, key: &str) {
        let kv_key = ticket_key(tenant, key);
        Self::mark(&mut self.dirty_tickets, &kv_key);
        self.tickets.insert(kv_key, None);
    }

    async fn load_series_stats(&mut self, tenant: &str, series: &str) -> Result<SeriesStats> {
        let kv_key = stats_key(tenant, series);
        if let Some(cached) = self.stats.get(&kv_key) {
            return Ok(cached.clone());
        }
        let stats = match self.kv.get(&kv_key).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            None => SeriesStats::default(),
        };
        self.stats.insert(kv_key, stats.clone());
        Ok(stats)
    }

    fn put_series_stats(&mut self, tenant: &str, series: &str, stats: SeriesStats) {
        let kv_key = stats_key(tenant, series);
        Self::mark(&mut self.dirty_stats, &kv_key);
        self.stats.insert(kv_key, stats);
    }

    async fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport {
            backend: "kv",
            ..FlushReport::default()
        };

        enum Write {
            Set(String, String),
            Del(String),
        }
        let mut writes = Vec::new();
        for key in self.dirty_tickets.drain(..) {
            match self.tickets.get(&key) {
                Some(Some(ticket)) => match serde_json::to_string(ticket) {
                    Ok(json) => {
                        report.tickets_written += 1;
                        writes.push(Write::Set(key, json));
                    }
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push(format!("{key}: {e}"));
                    }
                },
                _ => {
                    report.tickets_deleted += 1;
                    writes.push(Write::Del(key));
                }
            }
        }
        for key in self.dirty_stats.drain(..) {
            if let Some(stats) = self.stats.get(&key) {
                match serde_json::to_string(stats) {
                    Ok(json) => {
                        report.stats_written += 1;
                        writes.push(Write::Set(key, json));
                    }
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push(format!("{key}: {e}"));
                    }
                }
            }
        }

        let kv = &self.kv;
        let results = join_all(writes.iter().map(|write| async move {
            match write {
                Write::Set(key, json) => kv.set(key, json).await.map_err(|e| format!("{key}: {e}")),
                Write::Del(key) => kv.del(key).await.map_err(|e| format!("{key}: {e}")),
            }
        }))
        .await;

        for error in results.into_iter().filter_map(|r| r.err()) {
            warn!(error = %error, "kv write failed");
            report.failed += 1;
            report.errors.push(error);
        }
        debug!(
            tickets = report.tickets_written,
            deleted = report.tickets_deleted,
            stats = report.stats_written,
            failed = report.failed,
            "flushed kv ticket store"
        );
        report
    }
}

/// On-disk layout of the local ticket store: tenant → key → value.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TicketDocument {
    #[serde(default)]
    tickets: BTreeMap<String, BTreeMap<String, Ticket>>,
    #[serde(default)]
    stats: BTreeMap<String, BTreeMap<String, SeriesStats>>,
}

/// Ticket store over a local JSON file.
pub struct FileTicketStore {
    path: PathBuf,
    doc: Option<TicketDocument>,
    dirty: bool,
    pending: FlushReport,
}

impl FileTicketStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: None,
            dirty: false,
            pending: FlushReport::default(),
        }
    }

    fn doc(&mut self) -> Result<&mut TicketDocument> {
        if self.doc.is_none() {
            self.doc = Some(read_json_or_default(&self.path)?);
        }
        Ok(self.doc.get_or_insert_with(TicketDocument::default))
    }

    /// Buffered writes need the document; an unreadable file starts empty
    /// and is overwritten on flush.
    fn doc_for_write(&mut self) -> &mut TicketDocument {
        if self.doc.is_none() {
            let loaded = read_json_or_default(&self.path).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "ticket file unreadable, starting empty");
                TicketDocument::default()
            });
            self.doc = Some(loaded);
        }
        self.dirty = true;
        self.doc.get_or_insert_with(TicketDocument::default)
    }
}

#[async_trait]
impl TicketStore for FileTicketStore {
    async fn load_ticket(&mut self, tenant: &str, key: &str) -> Result<Option<Ticket>> {
        let doc = self.doc()?;
        Ok(doc.tickets.get(tenant).and_then(|t| t.get(key)).cloned())
    }

    fn put_ticket(&mut self, tenant: &str, ticket: Ticket) {
        self.pending.tickets_written += 1;
        let doc = self.doc_for_write();
        doc.tickets
            .entry(tenant.to_string())
            .or_default()
            .insert(ticket.ticket_key.clone(), ticket);
    }

    fn delete_ticket(&mut self, tenant: &str, key: &str) {
        self.pending.tickets_deleted += 1;
        let doc = self.doc_for_write();
        if let Some(tickets) = doc.tickets.get_mut(tenant) {
            tickets.remove(key);
            if tickets.is_empty() {
                doc.tickets.remove(tenant);
            }
        }
    }

    async fn load_series_stats(&mut self, tenant: &str, series: &str) -> Result<SeriesStats> {
        let doc = self.doc()?;
        Ok(doc
            .stats
            .get(tenant)
            .and_then(|s| s.get(series))
            .cloned()
            .unwrap_or_default())
    }

    fn put_series_stats(&mut self, tenant: &str, series: &str, stats: SeriesStats) {
        self.pending.stats_written += 1;
        let doc = self.doc_for_write();
        doc.stats
            .entry(tenant.to_string())
            .or_default()
            .insert(series.to_string(), stats);
    }

    async fn flush(&mut self) -> FlushReport {
        let mut report = std::mem::take(&mut self.pending);
        report.backend = "file";
        if !self.dirty {
            return report;
        }
        if let Some(doc) = &self.doc {
            if let Err(e) = atomic_write_json(&self.path, doc) {
                warn!(path = %self.path.display(), error = %e, "ticket file write failed");
                report.failed += 1;
                report.errors.push(e.to_string());
                return report;
            }
        }
        self.dirty = false;
        report
    }
}

/// Opens a fresh [`TicketStore`] per request.
#[derive(Clone)]
pub enum TicketStoreFactory {
    Kv(Arc<dyn KvBackend>),
    File(PathBuf),
}

impl TicketStoreFactory {
    /// Builds the factory for a configured backend.
    pub fn from_backend(backend: &TicketBackend) -> Result<Self> {
        Ok(match backend {
            TicketBackend::Kv(kv) => Self::Kv(Arc::new(RestKv::new(&kv.url, &kv.token)?)),
            TicketBackend::File(path) => Self::File(path.clone()),
        })
    }

    pub fn open(&self) -> Box<dyn TicketStore> {
        match self {
            Self::Kv(kv) => Box::new(KvTicketStore::new(kv.clone())),
            Self::File(path) => Box::new(FileTicketStore::new(path.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Kv(_) => "kv",
            Self::File(_) => "file",
        }
    }
}
