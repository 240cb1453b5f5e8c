use clap::{Parser, Subcommand};
use goldring::{
    Fleet,
    reconcile::{FleetDrift, FleetReport, ReconcileReport},
};

#[derive(Parser, Debug)]
#[command(name = "goldring", version, about = "Goldring tenant fleet CLI")]
struct Cli {
    /// Postgres administrative connection string. Falls back to
    /// GOLDRING_ADMIN_URL, then DATABASE_URL.
    #[arg(long)]
    admin_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Onboard a new organization: reserve a code, create and seed its database
    Onboard { organization: String },

    /// List registered tenants
    Tenants,

    /// Show missing schema objects without applying anything
    Drift {
        #[arg(long)]
        tenant: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Repair schema drift for one tenant, or the whole fleet
    Reconcile {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// List tenant databases no registry row claims
    Orphans,
}

#[tokio::main]
async fn main() -> goldring::Result<()> {
    let cli = Cli::parse();

    let url = match cli
        .admin_url
        .or_else(|| std::env::var("GOLDRING_ADMIN_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        Some(u) => u,
        None => {
            eprintln!("error: --admin-url or env GOLDRING_ADMIN_URL / DATABASE_URL is required");
            std::process::exit(2);
        }
    };

    let fleet = Fleet::connect(&url).await?;

    match cli.command {
        Commands::Onboard { organization } => {
            let record = fleet.onboard(&organization).await?;
            println!(
                "{} -> {}",
                record.tenant_code,
                record.database_name.as_deref().unwrap_or("<none>")
            );
        }
        Commands::Tenants => {
            let registry = fleet.registry();
            registry.ensure_catalog().await?;
            for record in registry.list().await? {
                println!(
                    "{}  {}  {}",
                    record.tenant_code,
                    record.database_name.as_deref().unwrap_or("<unprovisioned>"),
                    record.organization_name
                );
            }
        }
        Commands::Drift { tenant, json } => {
            let reconciler = fleet.reconciler();
            let drift = match tenant {
                Some(code) => FleetDrift {
                    reports: vec![reconciler.drift_tenant(&code).await?],
                    failures: Vec::new(),
                },
                None => reconciler.drift_all().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&drift)?);
            } else {
                print_drift(&drift);
            }
            if !drift.is_clean() {
                std::process::exit(1);
            }
        }
        Commands::Reconcile { tenant } => match tenant {
            Some(code) => {
                let report = fleet.reconciler().reconcile_tenant(&code).await?;
                print_reconcile(&report);
            }
            None => {
                let report = fleet.reconciler().reconcile_all().await?;
                print_fleet(&report);
                if report.failed > 0 {
                    std::process::exit(1);
                }
            }
        },
        Commands::Orphans => {
            let orphans = fleet
                .provisioner()
                .orphaned_databases(&fleet.registry())
                .await?;
            if orphans.is_empty() {
                println!("No orphaned tenant databases.");
            } else {
                for name in orphans {
                    println!("{name}");
                }
            }
        }
    }

    Ok(())
}

fn print_drift(drift: &FleetDrift) {
    for report in &drift.reports {
        if report.is_clean() {
            println!("{}: ok", report.tenant_code);
            continue;
        }
        println!("{}:", report.tenant_code);
        for table in &report.missing_tables {
            println!("  missing table {table}");
        }
        for index in &report.missing_indexes {
            println!("  missing index {index}");
        }
        for fk in &report.missing_foreign_keys {
            println!("  missing constraint {fk}");
        }
        for warning in &report.warnings {
            println!("  warning: {warning}");
        }
    }
    for failure in &drift.failures {
        eprintln!("{}: {}", failure.tenant_code, failure.error);
    }
}

fn print_reconcile(report: &ReconcileReport) {
    if report.is_clean() {
        println!("{}: no changes needed", report.tenant_code);
    } else {
        println!(
            "{}: created {} tables, {} indexes, {} constraints",
            report.tenant_code,
            report.tables_created,
            report.indexes_created,
            report.foreign_keys_added
        );
    }
}

fn print_fleet(report: &FleetReport) {
    println!(
        "{} succeeded, {} failed; created {} tables, {} indexes, {} constraints",
        report.succeeded,
        report.failed,
        report.tables_created,
        report.indexes_created,
        report.foreign_keys_added
    );
    for failure in &report.failures {
        eprintln!("{}: {}", failure.tenant_code, failure.error);
    }
}
