use std::collections::HashSet;
use std::time::Duration;

use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::{info, instrument};

use crate::{
    Error, Result,
    registry::Registry,
    schema::{SchemaManager, quote_ident},
    seed,
};

pub const DATABASE_PREFIX: &str = "RFID";

/// Whitespace and hyphens become underscores; nothing else is normalized.
/// Identical sanitized names stay distinguishable because the tenant code is
/// embedded in the database name.
pub fn sanitize_organization(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c })
        .collect()
}

pub fn compose_database_name(tenant_code: &str, organization_name: &str) -> String {
    format!(
        "{DATABASE_PREFIX}_{tenant_code}_{}",
        sanitize_organization(organization_name)
    )
}

/// Creates the physical database for one tenant, applies the full schema
/// catalog and seeds reference data. A failed step aborts the attempt and is
/// labeled with the stage that died; the database may be left behind (see
/// `orphaned_databases`), and retrying with the same code is not safe.
#[derive(Clone, Debug)]
pub struct Provisioner {
    admin_pool: PgPool,
    admin_opts: PgConnectOptions,
    ddl_timeout: Duration,
}

impl Provisioner {
    pub(crate) fn new(
        admin_pool: PgPool,
        admin_opts: PgConnectOptions,
        ddl_timeout: Duration,
    ) -> Self {
        Self {
            admin_pool,
            admin_opts,
            ddl_timeout,
        }
    }

    #[instrument(skip(self))]
    pub async fn provision(&self, organization_name: &str, tenant_code: &str) -> Result<String> {
        let database_name = compose_database_name(tenant_code, organization_name);

        self.create_database(&database_name)
            .await
            .map_err(|e| Error::provisioning("create database", e))?;

        let pool = self
            .tenant_pool(&database_name)
            .await
            .map_err(|e| Error::provisioning("connect tenant database", e))?;

        let schema = SchemaManager::new(pool.clone());
        schema
            .sync(self.ddl_timeout)
            .await
            .map_err(|e| Error::provisioning("apply schema", e))?;

        seed::seed_reference_data(&pool)
            .await
            .map_err(|e| Error::provisioning("seed reference data", e))?;

        pool.close().await;
        crate::metrics::record_database_provisioned();
        info!(database = %database_name, "tenant database provisioned");
        Ok(database_name)
    }

    async fn create_database(&self, database_name: &str) -> Result<()> {
        // create database cannot run in a transaction block; simple protocol
        let stmt = format!("create database {}", quote_ident(database_name));
        sqlx::raw_sql(&stmt).execute(&self.admin_pool).await?;
        Ok(())
    }

    pub(crate) async fn tenant_pool(&self, database_name: &str) -> Result<PgPool> {
        let opts = self.admin_opts.clone().database(database_name);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await?;
        Ok(pool)
    }

    /// Physical databases carrying the tenant prefix that no registry row
    /// claims — the leftovers of provisioning attempts that died after
    /// `create database`. Cleanup itself is an operator decision.
    pub async fn orphaned_databases(&self, registry: &Registry) -> Result<Vec<String>> {
        let pattern = format!("{DATABASE_PREFIX}\\_%");
        let names = sqlx::query_scalar::<_, String>(
            "select datname from pg_database where datname like $1 order by datname",
        )
        .bind(&pattern)
        .fetch_all(&self.admin_pool)
        .await?;

        let claimed: HashSet<String> = registry
            .list()
            .await?
            .into_iter()
            .filter_map(|r| r.database_name)
            .collect();

        Ok(names.into_iter().filter(|n| !claimed.contains(n)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_whitespace_and_hyphens_only() {
        assert_eq!(sanitize_organization("Acme Jewels"), "Acme_Jewels");
        assert_eq!(sanitize_organization("Ratna-Bhandar"), "Ratna_Bhandar");
        assert_eq!(sanitize_organization("A - B"), "A___B");
        assert_eq!(sanitize_organization("Müller & Söhne"), "Müller_&_Söhne");
    }

    #[test]
    fn database_name_embeds_the_tenant_code() {
        assert_eq!(
            compose_database_name("LS0001", "Acme Jewels"),
            "RFID_LS0001_Acme_Jewels"
        );
        // same sanitized organization, different tenants, distinct databases
        assert_ne!(
            compose_database_name("LS0001", "Acme Jewels"),
            compose_database_name("LS0002", "Acme Jewels")
        );
    }
}
