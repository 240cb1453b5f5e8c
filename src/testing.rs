use std::time::Duration;

use crate::{
    Error, Fleet, Result,
    provision::compose_database_name,
    registry::TenantRecord,
    schema::{SchemaManager, Stage, quote_ident},
    seed,
};

/// Provisions a tenant the way the product did before the auxiliary tables
/// shipped: database, baseline schema and seed data, nothing else. Gives
/// tests a historically accurate starting point for drift repair.
pub async fn provision_legacy_tenant(
    fleet: &Fleet,
    organization_name: &str,
) -> Result<TenantRecord> {
    let registry = fleet.registry();
    registry.ensure_catalog().await?;
    let tenant_code = registry.register(organization_name).await?;
    let database_name = compose_database_name(&tenant_code, organization_name);

    let stmt = format!("create database {}", quote_ident(&database_name));
    sqlx::raw_sql(&stmt).execute(fleet.admin_pool()).await?;

    let pool = fleet.provisioner().tenant_pool(&database_name).await?;
    let schema = SchemaManager::new(pool.clone());
    schema
        .sync_stage(Stage::Baseline, Duration::from_secs(60))
        .await?;
    seed::seed_reference_data(&pool).await?;
    pool.close().await;

    registry
        .set_database_name(&tenant_code, &database_name)
        .await?;
    registry
        .get(&tenant_code)
        .await?
        .ok_or(Error::TenantNotFound(tenant_code))
}

/// Drops a tenant database, open connections included.
pub async fn drop_tenant_database(fleet: &Fleet, database_name: &str) -> Result<()> {
    let stmt = format!(
        "drop database if exists {} with (force)",
        quote_ident(database_name)
    );
    sqlx::raw_sql(&stmt).execute(fleet.admin_pool()).await?;
    Ok(())
}
