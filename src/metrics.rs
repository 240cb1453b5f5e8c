use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Metrics {
    // Onboarding
    pub tenants_onboarded_total: AtomicU64,
    pub tenant_code_conflicts_total: AtomicU64,
    pub databases_provisioned_total: AtomicU64,

    // Reconciliation
    pub reconcile_runs_total: AtomicU64,
    pub reconcile_objects_created_total: AtomicU64,
    pub reconcile_failures_total: AtomicU64,

    // Resolution
    pub resolve_failures_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            tenants_onboarded_total: AtomicU64::new(0),
            tenant_code_conflicts_total: AtomicU64::new(0),
            databases_provisioned_total: AtomicU64::new(0),
            reconcile_runs_total: AtomicU64::new(0),
            reconcile_objects_created_total: AtomicU64::new(0),
            reconcile_failures_total: AtomicU64::new(0),
            resolve_failures_total: AtomicU64::new(0),
        }
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

pub(crate) fn record_onboarded() {
    metrics()
        .tenants_onboarded_total
        .fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_code_conflict() {
    metrics()
        .tenant_code_conflicts_total
        .fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_database_provisioned() {
    metrics()
        .databases_provisioned_total
        .fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_reconcile(objects_created: u64) {
    let m = metrics();
    m.reconcile_runs_total.fetch_add(1, Ordering::Relaxed);
    m.reconcile_objects_created_total
        .fetch_add(objects_created, Ordering::Relaxed);
}

pub(crate) fn record_reconcile_failure() {
    metrics()
        .reconcile_failures_total
        .fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_resolve_failure() {
    metrics()
        .resolve_failures_total
        .fetch_add(1, Ordering::Relaxed);
}

pub fn render_prometheus() -> String {
    let m = metrics();
    let mut s = String::new();
    let _ = writeln!(
        s,
        "# TYPE tenants_onboarded_total counter\ntenants_onboarded_total {}",
        m.tenants_onboarded_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE tenant_code_conflicts_total counter\ntenant_code_conflicts_total {}",
        m.tenant_code_conflicts_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE databases_provisioned_total counter\ndatabases_provisioned_total {}",
        m.databases_provisioned_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE reconcile_runs_total counter\nreconcile_runs_total {}",
        m.reconcile_runs_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE reconcile_objects_created_total counter\nreconcile_objects_created_total {}",
        m.reconcile_objects_created_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE reconcile_failures_total counter\nreconcile_failures_total {}",
        m.reconcile_failures_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE resolve_failures_total counter\nresolve_failures_total {}",
        m.resolve_failures_total.load(Ordering::Relaxed)
    );
    s
}
