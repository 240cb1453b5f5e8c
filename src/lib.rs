//! Goldring — multi-tenant database routing and provisioning, powered by Postgres.
//!
//! One isolated database per tenant on a single server: the registry maps
//! short tenant codes to database names, the provisioner creates and seeds
//! new tenant databases, the resolver turns a tenant code into a live
//! connection per request, and the reconciler detects and repairs schema
//! drift across the fleet.

mod error;
pub mod fleet;
pub mod metrics;
pub mod provision;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod seed;
pub mod testing;

pub use error::{Error, Result, WithContext};
pub use fleet::{Fleet, FleetBuilder};
pub use provision::Provisioner;
pub use reconcile::{DriftReport, FleetReport, ReconcileReport, Reconciler};
pub use registry::{Registry, TenantRecord};
pub use resolver::Resolver;
pub use schema::{SchemaManager, SchemaPlan};

pub mod prelude {
    pub use crate::{Error, Fleet, Result, TenantRecord};
}
