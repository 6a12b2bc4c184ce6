//! Persistence layer for QueueBell.
//!
//! Two stores live here:
//!
//! - [`TicketStore`]: per-request buffered ticket state and per-series
//!   statistics, backed by a shared KV ([`KvTicketStore`]) or a local JSON
//!   document ([`FileTicketStore`]). Nothing is written until `flush`.
//! - [`TenantStore`]: a façade over the hierarchical [`RealtimeDb`] that
//!   confines every read and write to `tenants/{slug}/…`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use queuebell_models::Slug;
//! use queuebell_persistence::{MemoryDb, TenantPatch, TenantStore};
//!
//! # async fn demo() -> queuebell_persistence::Result<()> {
//! let db = Arc::new(MemoryDb::new());
//! let store = TenantStore::new(db, Slug::parse("acme")?);
//!
//! let mut patch = TenantPatch::new();
//! patch.set("queue/q1/status", "served");
//! patch.set("analytics/servedCount", 1);
//! store.patch(patch).await?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod error;
pub mod kv;
pub mod realtime;
pub mod tenant_store;
pub mod ticket_store;

pub use error::{PersistenceError, Result};
pub use kv::{KvBackend, MemoryKv, RestKv};
pub use realtime::{validate_path, CreateOutcome, FirebaseDb, MemoryDb, RealtimeDb};
pub use tenant_store::{Scope, TenantPatch, TenantStore};
pub use ticket_store::{
    FileTicketStore, FlushReport, KvTicketStore, TicketStore, TicketStoreFactory,
};
