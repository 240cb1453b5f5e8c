use anyhow::Result;
use goldring::{Fleet, schema, testing};
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};

async fn start_postgres() -> Result<(ContainerAsync<GenericImage>, String)> {
    let image = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_USER", "postgres")
        .with_env_var("POSTGRES_PASSWORD", "postgres");

    let container = image.start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgres://postgres:postgres@{host}:{port}/postgres?sslmode=disable");
    Ok((container, url))
}

#[tokio::test]
async fn legacy_tenant_reconciles_exactly_once() -> Result<()> {
    let (_container, url) = start_postgres().await?;
    let fleet = Fleet::connect(&url).await?;

    let record = testing::provision_legacy_tenant(&fleet, "Heritage Jewellers").await?;
    let reconciler = fleet.reconciler();

    // drift shows exactly the auxiliary whitelist before repair
    let drift = reconciler.drift_tenant(&record.tenant_code).await?;
    assert_eq!(
        drift.missing_tables.len(),
        schema::auxiliary_table_count()
    );
    assert!(drift.missing_tables.contains(&"rfid_tags".to_string()));

    let first = reconciler.reconcile_tenant(&record.tenant_code).await?;
    assert_eq!(first.tables_created, schema::auxiliary_table_count());
    assert!(first.indexes_created > 0);
    assert!(first.foreign_keys_added > 0);

    let second = reconciler.reconcile_tenant(&record.tenant_code).await?;
    assert!(second.is_clean(), "second run must be a no-op: {second:?}");

    let drift = reconciler.drift_tenant(&record.tenant_code).await?;
    assert!(drift.is_clean());
    Ok(())
}

#[tokio::test]
async fn freshly_onboarded_tenant_has_no_drift() -> Result<()> {
    let (_container, url) = start_postgres().await?;
    let fleet = Fleet::connect(&url).await?;

    let record = fleet.onboard("Acme Jewels").await?;
    let reconciler = fleet.reconciler();

    let drift = reconciler.drift_tenant(&record.tenant_code).await?;
    assert!(drift.is_clean(), "fresh tenant must not drift: {drift:?}");

    let report = reconciler.reconcile_tenant(&record.tenant_code).await?;
    assert!(report.is_clean());
    Ok(())
}

#[tokio::test]
async fn one_broken_tenant_does_not_abort_the_fleet() -> Result<()> {
    let (_container, url) = start_postgres().await?;
    let fleet = Fleet::connect(&url).await?;

    let a = testing::provision_legacy_tenant(&fleet, "Alpha Ornaments").await?;
    let b = testing::provision_legacy_tenant(&fleet, "Broken Bangles").await?;
    let c = testing::provision_legacy_tenant(&fleet, "Gamma Gold House").await?;

    let b_database = b.database_name.as_deref().expect("provisioned");
    testing::drop_tenant_database(&fleet, b_database).await?;

    let report = fleet.reconciler().reconcile_all().await?;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].tenant_code, b.tenant_code);
    assert_eq!(
        report.tables_created,
        2 * schema::auxiliary_table_count(),
        "both healthy tenants must be fully repaired"
    );

    // the survivors are actually consistent now
    let reconciler = fleet.reconciler();
    assert!(reconciler.drift_tenant(&a.tenant_code).await?.is_clean());
    assert!(reconciler.drift_tenant(&c.tenant_code).await?.is_clean());

    // the read-only fleet report isolates the same failure
    let drift = reconciler.drift_all().await?;
    assert_eq!(drift.reports.len(), 2);
    assert_eq!(drift.failures.len(), 1);
    assert_eq!(drift.failures[0].tenant_code, b.tenant_code);
    Ok(())
}

#[tokio::test]
async fn orphaned_databases_are_reported() -> Result<()> {
    let (_container, url) = start_postgres().await?;
    let fleet = Fleet::connect(&url).await?;

    fleet.onboard("Acme Jewels").await?;

    // simulate a provisioning attempt that died before the registry write-back
    sqlx::raw_sql("create database \"RFID_LS0099_Dead_Attempt\"")
        .execute(fleet.admin_pool())
        .await?;

    let orphans = fleet
        .provisioner()
        .orphaned_databases(&fleet.registry())
        .await?;
    assert_eq!(orphans, vec!["RFID_LS0099_Dead_Attempt".to_string()]);
    Ok(())
}
