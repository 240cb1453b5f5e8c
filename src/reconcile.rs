use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{info, instrument, warn};

use crate::{
    Result,
    registry::Registry,
    resolver::Resolver,
    schema::{SchemaActionKind, SchemaManager},
};

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub tenant_code: String,
    pub tables_created: usize,
    pub indexes_created: usize,
    pub foreign_keys_added: usize,
}

impl ReconcileReport {
    pub fn objects_created(&self) -> usize {
        self.tables_created + self.indexes_created + self.foreign_keys_added
    }

    pub fn is_clean(&self) -> bool {
        self.objects_created() == 0
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FleetReport {
    pub succeeded: usize,
    pub failed: usize,
    pub tables_created: usize,
    pub indexes_created: usize,
    pub foreign_keys_added: usize,
    pub failures: Vec<FleetFailure>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FleetFailure {
    pub tenant_code: String,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DriftReport {
    pub tenant_code: String,
    pub missing_tables: Vec<String>,
    pub missing_indexes: Vec<String>,
    pub missing_foreign_keys: Vec<String>,
    pub warnings: Vec<String>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing_tables.is_empty()
            && self.missing_indexes.is_empty()
            && self.missing_foreign_keys.is_empty()
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FleetDrift {
    pub reports: Vec<DriftReport>,
    pub failures: Vec<FleetFailure>,
}

impl FleetDrift {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.reports.iter().all(DriftReport::is_clean)
    }
}

/// Detects and repairs schema drift across the tenant fleet. Tenants are
/// independent databases, so the fleet pass runs them concurrently up to a
/// bound; the steps within one tenant stay serialized.
#[derive(Clone)]
pub struct Reconciler {
    registry: Registry,
    resolver: Resolver,
    ddl_timeout: Duration,
    concurrency: usize,
}

impl Reconciler {
    pub(crate) fn new(
        registry: Registry,
        resolver: Resolver,
        ddl_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            resolver,
            ddl_timeout,
            concurrency,
        }
    }

    /// Brings one tenant up to the full schema catalog. Returns zero counts
    /// when the tenant was already consistent.
    #[instrument(skip(self))]
    pub async fn reconcile_tenant(&self, tenant_code: &str) -> Result<ReconcileReport> {
        let pool = self.resolver.pool(tenant_code, 1).await?;
        let schema = SchemaManager::new(pool.clone());
        let result = schema.sync(self.ddl_timeout).await;
        pool.close().await;
        let plan = result?;

        let report = ReconcileReport {
            tenant_code: tenant_code.to_string(),
            tables_created: plan.count(SchemaActionKind::Table),
            indexes_created: plan.count(SchemaActionKind::Index),
            foreign_keys_added: plan.count(SchemaActionKind::ForeignKey),
        };
        crate::metrics::record_reconcile(report.objects_created() as u64);
        if !report.is_clean() {
            info!(
                tenant_code = %report.tenant_code,
                tables = report.tables_created,
                indexes = report.indexes_created,
                foreign_keys = report.foreign_keys_added,
                "schema drift repaired"
            );
        }
        Ok(report)
    }

    /// Reconciles every registered tenant. One tenant's failure is logged and
    /// counted, never a reason to abort the siblings.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<FleetReport> {
        let records = self.registry.list().await?;
        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut join = JoinSet::new();

        for record in records {
            let reconciler = self.clone();
            let semaphore = semaphore.clone();
            join.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome = reconciler.reconcile_tenant(&record.tenant_code).await;
                (record.tenant_code, outcome)
            });
        }

        let mut report = FleetReport::default();
        while let Some(joined) = join.join_next().await {
            let (tenant_code, outcome) = joined.expect("reconcile task panicked");
            match outcome {
                Ok(tenant_report) => {
                    report.succeeded += 1;
                    report.tables_created += tenant_report.tables_created;
                    report.indexes_created += tenant_report.indexes_created;
                    report.foreign_keys_added += tenant_report.foreign_keys_added;
                }
                Err(e) => {
                    crate::metrics::record_reconcile_failure();
                    warn!(tenant_code = %tenant_code, error = %e, "tenant reconciliation failed");
                    report.failed += 1;
                    report.failures.push(FleetFailure {
                        tenant_code,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.failures.sort_by(|a, b| a.tenant_code.cmp(&b.tenant_code));

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            objects = report.tables_created + report.indexes_created + report.foreign_keys_added,
            "fleet reconciliation finished"
        );
        Ok(report)
    }

    /// Read-only drift check for one tenant: what is missing, applying
    /// nothing.
    pub async fn drift_tenant(&self, tenant_code: &str) -> Result<DriftReport> {
        let pool = self.resolver.pool(tenant_code, 1).await?;
        let schema = SchemaManager::new(pool.clone());
        let result = schema.plan().await;
        pool.close().await;
        let plan = result?;

        Ok(DriftReport {
            tenant_code: tenant_code.to_string(),
            missing_tables: plan.objects(SchemaActionKind::Table),
            missing_indexes: plan.objects(SchemaActionKind::Index),
            missing_foreign_keys: plan.objects(SchemaActionKind::ForeignKey),
            warnings: plan.warnings().to_vec(),
        })
    }

    /// Fleet-wide drift report with the same failure isolation as the repair
    /// pass.
    pub async fn drift_all(&self) -> Result<FleetDrift> {
        let records = self.registry.list().await?;
        let mut drift = FleetDrift::default();
        for record in records {
            match self.drift_tenant(&record.tenant_code).await {
                Ok(report) => drift.reports.push(report),
                Err(e) => {
                    warn!(tenant_code = %record.tenant_code, error = %e, "tenant drift check failed");
                    drift.failures.push(FleetFailure {
                        tenant_code: record.tenant_code,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(drift)
    }
}
