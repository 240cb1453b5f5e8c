use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::info;

use crate::{
    Error, Result,
    provision::Provisioner,
    reconcile::Reconciler,
    registry::{Registry, TenantRecord},
    resolver::Resolver,
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DDL_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_RECONCILE_CONCURRENCY: usize = 4;

/// Entry point for the tenant fleet: owns the administrative connection and
/// hands out the registry, resolver, provisioner and reconciler. The
/// administrative credentials must be allowed to create databases and to
/// connect to every tenant database on the server.
#[derive(Clone)]
pub struct Fleet {
    admin_pool: PgPool,
    admin_opts: PgConnectOptions,
    connect_timeout: Duration,
    ddl_timeout: Duration,
    reconcile_concurrency: usize,
}

impl Fleet {
    pub async fn connect(url: &str) -> Result<Self> {
        Self::builder(url).build().await
    }

    pub fn builder(url: impl Into<String>) -> FleetBuilder {
        FleetBuilder::new(url)
    }

    pub fn registry(&self) -> Registry {
        Registry::new(self.admin_pool.clone())
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(
            self.registry(),
            self.admin_opts.clone(),
            self.connect_timeout,
        )
    }

    pub fn provisioner(&self) -> Provisioner {
        Provisioner::new(
            self.admin_pool.clone(),
            self.admin_opts.clone(),
            self.ddl_timeout,
        )
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.registry(),
            self.resolver(),
            self.ddl_timeout,
            self.reconcile_concurrency,
        )
    }

    pub fn admin_pool(&self) -> &PgPool {
        &self.admin_pool
    }

    /// Onboards one organization end to end: reserve a code, create and
    /// initialize the database, record the mapping. The returned record is
    /// the fully provisioned registry row.
    pub async fn onboard(&self, organization_name: &str) -> Result<TenantRecord> {
        let registry = self.registry();
        registry.ensure_catalog().await?;
        let tenant_code = registry.register(organization_name).await?;
        let database_name = self
            .provisioner()
            .provision(organization_name, &tenant_code)
            .await?;
        registry
            .set_database_name(&tenant_code, &database_name)
            .await?;
        crate::metrics::record_onboarded();
        info!(tenant_code = %tenant_code, database = %database_name, "tenant onboarded");
        registry
            .get(&tenant_code)
            .await?
            .ok_or(Error::TenantNotFound(tenant_code))
    }

    /// Lightweight liveness check for the administrative pool.
    pub async fn pool_health(&self) -> Result<PoolHealth> {
        let one: i32 = sqlx::query_scalar("select 1")
            .fetch_one(&self.admin_pool)
            .await?;
        Ok(PoolHealth { ok: one == 1 })
    }
}

pub struct FleetBuilder {
    url: String,
    max_connections: Option<u32>,
    connect_timeout: Duration,
    ddl_timeout: Duration,
    reconcile_concurrency: usize,
}

impl FleetBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ddl_timeout: DEFAULT_DDL_TIMEOUT,
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max.max(1));
        self
    }

    /// Timeout for request-path connections (resolver). Distinct from the
    /// DDL timeout on purpose.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Statement timeout for schema DDL. Generous by default; large tenants
    /// take minutes to patch.
    pub fn ddl_timeout(mut self, timeout: Duration) -> Self {
        self.ddl_timeout = timeout;
        self
    }

    /// How many tenants the fleet reconciler works on at once.
    pub fn reconcile_concurrency(mut self, concurrency: usize) -> Self {
        self.reconcile_concurrency = concurrency.max(1);
        self
    }

    pub async fn build(self) -> Result<Fleet> {
        let admin_opts = PgConnectOptions::from_str(&self.url)
            .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;

        let mut opts = PgPoolOptions::new().acquire_timeout(self.connect_timeout);
        if let Some(max) = self.max_connections {
            opts = opts.max_connections(max);
        }
        let admin_pool = opts.connect_with(admin_opts.clone()).await?;

        Ok(Fleet {
            admin_pool,
            admin_opts,
            connect_timeout: self.connect_timeout,
            ddl_timeout: self.ddl_timeout,
            reconcile_concurrency: self.reconcile_concurrency,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PoolHealth {
    pub ok: bool,
}
