//! Migration of legacy single-tenant data into `tenants/{slug}`.
//!
//! Before multi-tenancy every node lived at the database root. This crate
//! copies those nodes under a tenant namespace, one patch per tenant, and
//! leaves the source untouched.

pub mod error;
pub mod plan;

pub use error::{MigrateError, Result};
pub use plan::{
    apply, load_map, plan_tenant, run, MigrationTarget, NodePlan, NodeStatus, TenantPlan,
    LEGACY_NODES,
};
