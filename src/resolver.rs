use std::time::Duration;

use sqlx::{
    ConnectOptions, PgPool,
    postgres::{PgConnectOptions, PgConnection, PgPoolOptions},
};

use crate::{Error, Result, registry::Registry};

/// Maps a tenant code to a live connection descriptor on every request.
/// Same server and credentials as the administrative connection, different
/// database segment. Nothing is cached across requests.
#[derive(Clone, Debug)]
pub struct Resolver {
    registry: Registry,
    admin_opts: PgConnectOptions,
    connect_timeout: Duration,
}

impl Resolver {
    pub(crate) fn new(
        registry: Registry,
        admin_opts: PgConnectOptions,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            admin_opts,
            connect_timeout,
        }
    }

    /// Connection descriptor for a tenant. Unknown codes (malformed ones
    /// included) fail as `TenantNotFound`; a registered tenant whose
    /// provisioning never finished fails as `TenantNotProvisioned` so callers
    /// can tell the two states apart.
    pub async fn resolve(&self, tenant_code: &str) -> Result<PgConnectOptions> {
        let record = self.registry.get(tenant_code).await?.ok_or_else(|| {
            crate::metrics::record_resolve_failure();
            Error::TenantNotFound(tenant_code.to_string())
        })?;
        let database_name = record.database_name.ok_or_else(|| {
            crate::metrics::record_resolve_failure();
            Error::TenantNotProvisioned(tenant_code.to_string())
        })?;
        Ok(self.admin_opts.clone().database(&database_name))
    }

    /// Request-scoped connection: acquired at the start of a unit of work,
    /// dropped by the caller on every exit path.
    pub async fn connect(&self, tenant_code: &str) -> Result<PgConnection> {
        let opts = self.resolve(tenant_code).await?;
        let conn = tokio::time::timeout(self.connect_timeout, opts.connect())
            .await
            .map_err(|_| Error::Db(sqlx::Error::Io(std::io::ErrorKind::TimedOut.into())))??;
        Ok(conn)
    }

    /// Scoped pool for collaborators that run several queries against one
    /// tenant (the reconciler does). Short acquire timeout; the caller closes
    /// the pool when the unit of work ends.
    pub async fn pool(&self, tenant_code: &str, max_connections: u32) -> Result<PgPool> {
        let opts = self.resolve(tenant_code).await?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(self.connect_timeout)
            .connect_with(opts)
            .await?;
        Ok(pool)
    }
}
