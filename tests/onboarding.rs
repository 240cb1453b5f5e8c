use anyhow::Result;
use goldring::{Error, Fleet, seed};
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
async fn onboarding_two_organizations_is_independent() -> Result<()> {
    let (_container, url) = start_postgres().await?;
    let fleet = Fleet::connect(&url).await?;

    let acme = fleet.onboard("Acme Jewels").await?;
    assert_eq!(acme.tenant_code, "LS0001");
    assert_eq!(
        acme.database_name.as_deref(),
        Some("RFID_LS0001_Acme_Jewels")
    );

    let beta = fleet.onboard("Beta Gems").await?;
    assert_eq!(beta.tenant_code, "LS0002");
    assert_eq!(beta.database_name.as_deref(), Some("RFID_LS0002_Beta_Gems"));

    // the resolver hands back a descriptor targeting the stored database
    let opts = fleet.resolver().resolve("LS0001").await?;
    assert_eq!(opts.get_database(), Some("RFID_LS0001_Acme_Jewels"));

    // each tenant database carries the full seeded reference catalog
    let pool = fleet.resolver().pool("LS0001", 1).await?;
    let categories: i64 = sqlx::query_scalar("select count(*) from categories")
        .fetch_one(&pool)
        .await?;
    let branches: i64 = sqlx::query_scalar("select count(*) from branches")
        .fetch_one(&pool)
        .await?;
    let counters: i64 = sqlx::query_scalar("select count(*) from counters")
        .fetch_one(&pool)
        .await?;
    assert_eq!(categories, seed::CATEGORIES.len() as i64);
    assert_eq!(branches, seed::BRANCHES.len() as i64);
    assert_eq!(counters, seed::COUNTERS.len() as i64);
    pool.close().await;

    // tenant 2 starts empty apart from the seed, untouched by tenant 1
    let pool = fleet.resolver().pool("LS0002", 1).await?;
    let products: i64 = sqlx::query_scalar("select count(*) from products")
        .fetch_one(&pool)
        .await?;
    assert_eq!(products, 0);
    pool.close().await;

    Ok(())
}

#[tokio::test]
async fn seeding_twice_never_duplicates() -> Result<()> {
    let (_container, url) = start_postgres().await?;
    let fleet = Fleet::connect(&url).await?;

    fleet.onboard("Acme Jewels").await?;
    let pool = fleet.resolver().pool("LS0001", 1).await?;

    let rerun = seed::seed_reference_data(&pool).await?;
    assert_eq!(rerun.total(), 0, "second seed run must insert nothing");

    let purities: i64 = sqlx::query_scalar("select count(*) from purities")
        .fetch_one(&pool)
        .await?;
    assert_eq!(purities, seed::PURITIES.len() as i64);
    pool.close().await;

    Ok(())
}

#[tokio::test]
async fn resolver_distinguishes_unknown_from_unprovisioned() -> Result<()> {
    let (_container, url) = start_postgres().await?;
    let fleet = Fleet::connect(&url).await?;

    let registry = fleet.registry();
    registry.ensure_catalog().await?;
    let code = registry.register("Gamma Gold House").await?;

    let err = fleet
        .resolver()
        .resolve(&code)
        .await
        .expect_err("registered but unprovisioned tenant must not resolve");
    assert!(matches!(err, Error::TenantNotProvisioned(_)));

    let err = fleet
        .resolver()
        .resolve("LS9999")
        .await
        .expect_err("unknown tenant must not resolve");
    assert!(matches!(err, Error::TenantNotFound(_)));

    Ok(())
}

#[tokio::test]
async fn concurrent_registrations_get_distinct_codes() -> Result<()> {
    let (_container, url) = start_postgres().await?;
    let fleet = Fleet::connect(&url).await?;

    let registry = fleet.registry();
    registry.ensure_catalog().await?;

    let mut handles = Vec::new();
    for i in 0..6 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.register(&format!("Concurrent Org {i}")).await
        }));
    }

    let mut codes = Vec::new();
    for handle in handles {
        codes.push(handle.await??);
    }

    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 6, "every registration must get a unique code");

    let records = registry.list().await?;
    assert_eq!(records.len(), 6);
    Ok(())
}
