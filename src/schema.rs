use std::collections::HashSet;
use std::time::Duration;

use crate::Result;
use indoc::indoc;
use sqlx::PgPool;

/// When a table entered the product: `Baseline` tables ship with the first
/// release, `Auxiliary` tables were added later and may be missing on tenants
/// provisioned before they existed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Baseline,
    Auxiliary,
}

pub struct TableSpec {
    pub name: &'static str,
    pub stage: Stage,
    pub create_sql: &'static str,
    pub indexes: &'static [IndexSpec],
    pub foreign_keys: &'static [ForeignKeySpec],
}

pub struct IndexSpec {
    pub name: &'static str,
    pub create_sql: &'static str,
}

/// Foreign keys are issued only when the referenced table is present (or
/// created by the same plan). Auxiliary tables reached some tenants before
/// the tables they point at, so the constraint is data, not an assumption.
pub struct ForeignKeySpec {
    pub name: &'static str,
    pub references: &'static str,
    pub create_sql: &'static str,
}

/// The one ordered catalog of every table a tenant database must contain.
/// Order matters: referenced tables come before their referents, and the
/// provisioner and reconciler both walk this list front to back.
pub const TABLES: &[TableSpec] = &[
    TableSpec {
        name: "categories",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists categories (
                id uuid primary key,
                name text not null unique,
                hsn_code text null,
                created_at timestamptz not null default now()
            )
        "},
        indexes: &[],
        foreign_keys: &[],
    },
    TableSpec {
        name: "product_types",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists product_types (
                id uuid primary key,
                name text not null unique
            )
        "},
        indexes: &[],
        foreign_keys: &[],
    },
    TableSpec {
        name: "designs",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists designs (
                id uuid primary key,
                name text not null unique
            )
        "},
        indexes: &[],
        foreign_keys: &[],
    },
    TableSpec {
        name: "purities",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists purities (
                id uuid primary key,
                name text not null unique,
                fineness numeric(6, 2) not null
            )
        "},
        indexes: &[],
        foreign_keys: &[],
    },
    TableSpec {
        name: "branches",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists branches (
                id uuid primary key,
                code text not null unique,
                name text not null,
                address text null,
                phone text null,
                created_at timestamptz not null default now()
            )
        "},
        indexes: &[],
        foreign_keys: &[],
    },
    TableSpec {
        name: "counters",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists counters (
                id uuid primary key,
                branch_id uuid not null references branches (id),
                code text not null,
                name text not null,
                unique (branch_id, code)
            )
        "},
        indexes: &[],
        foreign_keys: &[],
    },
    TableSpec {
        name: "products",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists products (
                id uuid primary key,
                sku text not null unique,
                name text not null,
                category_id uuid not null references categories (id),
                product_type_id uuid not null references product_types (id),
                design_id uuid null references designs (id),
                purity_id uuid not null references purities (id),
                branch_id uuid not null references branches (id),
                counter_id uuid null references counters (id),
                gross_weight numeric(10, 3) not null,
                stone_weight numeric(10, 3) not null default 0,
                net_weight numeric(10, 3) not null,
                making_charge numeric(12, 2) not null default 0,
                status text not null default 'in_stock',
                created_at timestamptz not null default now(),
                updated_at timestamptz not null default now()
            )
        "},
        indexes: &[
            IndexSpec {
                name: "products_category_idx",
                create_sql: "create index if not exists products_category_idx on products (category_id)",
            },
            IndexSpec {
                name: "products_branch_status_idx",
                create_sql: "create index if not exists products_branch_status_idx on products (branch_id, status)",
            },
            IndexSpec {
                name: "products_counter_idx",
                create_sql: "create index if not exists products_counter_idx on products (counter_id)",
            },
        ],
        foreign_keys: &[],
    },
    TableSpec {
        name: "invoices",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists invoices (
                id uuid primary key,
                invoice_no text not null unique,
                branch_id uuid not null references branches (id),
                customer_name text not null,
                customer_gstin text null,
                subtotal numeric(14, 2) not null default 0,
                cgst numeric(14, 2) not null default 0,
                sgst numeric(14, 2) not null default 0,
                igst numeric(14, 2) not null default 0,
                grand_total numeric(14, 2) not null default 0,
                status text not null default 'issued',
                issued_at timestamptz not null default now()
            )
        "},
        indexes: &[IndexSpec {
            name: "invoices_branch_issued_idx",
            create_sql: "create index if not exists invoices_branch_issued_idx on invoices (branch_id, issued_at)",
        }],
        foreign_keys: &[],
    },
    TableSpec {
        name: "invoice_items",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists invoice_items (
                id uuid primary key,
                invoice_id uuid not null references invoices (id) on delete cascade,
                product_id uuid null references products (id),
                description text not null,
                hsn_code text null,
                quantity int not null default 1,
                rate numeric(14, 2) not null,
                taxable_value numeric(14, 2) not null,
                gst_rate numeric(5, 2) not null
            )
        "},
        indexes: &[IndexSpec {
            name: "invoice_items_invoice_idx",
            create_sql: "create index if not exists invoice_items_invoice_idx on invoice_items (invoice_id)",
        }],
        foreign_keys: &[],
    },
    TableSpec {
        name: "stock_transfers",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists stock_transfers (
                id uuid primary key,
                transfer_no text not null unique,
                from_branch_id uuid not null references branches (id),
                to_branch_id uuid not null references branches (id),
                status text not null default 'pending',
                created_at timestamptz not null default now(),
                completed_at timestamptz null
            )
        "},
        indexes: &[IndexSpec {
            name: "stock_transfers_to_status_idx",
            create_sql: "create index if not exists stock_transfers_to_status_idx on stock_transfers (to_branch_id, status)",
        }],
        foreign_keys: &[],
    },
    TableSpec {
        name: "stock_transfer_items",
        stage: Stage::Baseline,
        create_sql: indoc! {"
            create table if not exists stock_transfer_items (
                id uuid primary key,
                transfer_id uuid not null references stock_transfers (id) on delete cascade,
                product_id uuid not null references products (id),
                status text not null default 'in_transit'
            )
        "},
        indexes: &[IndexSpec {
            name: "stock_transfer_items_transfer_idx",
            create_sql: "create index if not exists stock_transfer_items_transfer_idx on stock_transfer_items (transfer_id)",
        }],
        foreign_keys: &[],
    },
    // RFID inventory tracking, deployed after the initial release.
    TableSpec {
        name: "rfid_tags",
        stage: Stage::Auxiliary,
        create_sql: indoc! {"
            create table if not exists rfid_tags (
                tag_uid text primary key,
                product_id uuid null,
                branch_id uuid null,
                status text not null default 'unassigned',
                assigned_at timestamptz null,
                last_seen_at timestamptz null
            )
        "},
        indexes: &[
            IndexSpec {
                name: "rfid_tags_product_idx",
                create_sql: "create index if not exists rfid_tags_product_idx on rfid_tags (product_id)",
            },
            IndexSpec {
                name: "rfid_tags_status_idx",
                create_sql: "create index if not exists rfid_tags_status_idx on rfid_tags (status)",
            },
            IndexSpec {
                name: "rfid_tags_branch_status_idx",
                create_sql: "create index if not exists rfid_tags_branch_status_idx on rfid_tags (branch_id, status)",
            },
            IndexSpec {
                name: "rfid_tags_last_seen_idx",
                create_sql: "create index if not exists rfid_tags_last_seen_idx on rfid_tags (last_seen_at)",
            },
        ],
        foreign_keys: &[
            ForeignKeySpec {
                name: "rfid_tags_product_id_fkey",
                references: "products",
                create_sql: "alter table rfid_tags add constraint rfid_tags_product_id_fkey foreign key (product_id) references products (id)",
            },
            ForeignKeySpec {
                name: "rfid_tags_branch_id_fkey",
                references: "branches",
                create_sql: "alter table rfid_tags add constraint rfid_tags_branch_id_fkey foreign key (branch_id) references branches (id)",
            },
        ],
    },
    TableSpec {
        name: "rfid_scan_sessions",
        stage: Stage::Auxiliary,
        create_sql: indoc! {"
            create table if not exists rfid_scan_sessions (
                id uuid primary key,
                branch_id uuid not null,
                counter_id uuid null,
                mode text not null default 'audit',
                started_at timestamptz not null default now(),
                finished_at timestamptz null
            )
        "},
        indexes: &[
            IndexSpec {
                name: "rfid_scan_sessions_branch_started_idx",
                create_sql: "create index if not exists rfid_scan_sessions_branch_started_idx on rfid_scan_sessions (branch_id, started_at)",
            },
            IndexSpec {
                name: "rfid_scan_sessions_mode_idx",
                create_sql: "create index if not exists rfid_scan_sessions_mode_idx on rfid_scan_sessions (mode)",
            },
        ],
        foreign_keys: &[
            ForeignKeySpec {
                name: "rfid_scan_sessions_branch_id_fkey",
                references: "branches",
                create_sql: "alter table rfid_scan_sessions add constraint rfid_scan_sessions_branch_id_fkey foreign key (branch_id) references branches (id)",
            },
            ForeignKeySpec {
                name: "rfid_scan_sessions_counter_id_fkey",
                references: "counters",
                create_sql: "alter table rfid_scan_sessions add constraint rfid_scan_sessions_counter_id_fkey foreign key (counter_id) references counters (id)",
            },
        ],
    },
    TableSpec {
        name: "rfid_scan_events",
        stage: Stage::Auxiliary,
        create_sql: indoc! {"
            create table if not exists rfid_scan_events (
                id bigserial primary key,
                session_id uuid not null,
                tag_uid text not null,
                antenna int null,
                scanned_at timestamptz not null default now()
            )
        "},
        indexes: &[
            IndexSpec {
                name: "rfid_scan_events_session_idx",
                create_sql: "create index if not exists rfid_scan_events_session_idx on rfid_scan_events (session_id)",
            },
            IndexSpec {
                name: "rfid_scan_events_tag_scanned_idx",
                create_sql: "create index if not exists rfid_scan_events_tag_scanned_idx on rfid_scan_events (tag_uid, scanned_at)",
            },
            IndexSpec {
                name: "rfid_scan_events_scanned_idx",
                create_sql: "create index if not exists rfid_scan_events_scanned_idx on rfid_scan_events (scanned_at)",
            },
        ],
        foreign_keys: &[ForeignKeySpec {
            name: "rfid_scan_events_session_id_fkey",
            references: "rfid_scan_sessions",
            create_sql: "alter table rfid_scan_events add constraint rfid_scan_events_session_id_fkey foreign key (session_id) references rfid_scan_sessions (id)",
        }],
    },
    TableSpec {
        name: "daily_branch_balances",
        stage: Stage::Auxiliary,
        create_sql: indoc! {"
            create table if not exists daily_branch_balances (
                id uuid primary key,
                branch_id uuid not null,
                balance_date date not null,
                opening_pieces int not null default 0,
                opening_grams numeric(12, 3) not null default 0,
                inward_grams numeric(12, 3) not null default 0,
                outward_grams numeric(12, 3) not null default 0,
                closing_pieces int not null default 0,
                closing_grams numeric(12, 3) not null default 0,
                computed_at timestamptz not null default now(),
                unique (branch_id, balance_date)
            )
        "},
        indexes: &[IndexSpec {
            name: "daily_branch_balances_date_idx",
            create_sql: "create index if not exists daily_branch_balances_date_idx on daily_branch_balances (balance_date)",
        }],
        foreign_keys: &[ForeignKeySpec {
            name: "daily_branch_balances_branch_id_fkey",
            references: "branches",
            create_sql: "alter table daily_branch_balances add constraint daily_branch_balances_branch_id_fkey foreign key (branch_id) references branches (id)",
        }],
    },
    TableSpec {
        name: "stock_verifications",
        stage: Stage::Auxiliary,
        create_sql: indoc! {"
            create table if not exists stock_verifications (
                id uuid primary key,
                verification_no text not null unique,
                branch_id uuid not null,
                counter_id uuid null,
                status text not null default 'in_progress',
                started_at timestamptz not null default now(),
                completed_at timestamptz null,
                matched_count int not null default 0,
                missing_count int not null default 0,
                extra_count int not null default 0
            )
        "},
        indexes: &[
            IndexSpec {
                name: "stock_verifications_branch_status_idx",
                create_sql: "create index if not exists stock_verifications_branch_status_idx on stock_verifications (branch_id, status)",
            },
            IndexSpec {
                name: "stock_verifications_started_idx",
                create_sql: "create index if not exists stock_verifications_started_idx on stock_verifications (started_at)",
            },
        ],
        foreign_keys: &[
            ForeignKeySpec {
                name: "stock_verifications_branch_id_fkey",
                references: "branches",
                create_sql: "alter table stock_verifications add constraint stock_verifications_branch_id_fkey foreign key (branch_id) references branches (id)",
            },
            ForeignKeySpec {
                name: "stock_verifications_counter_id_fkey",
                references: "counters",
                create_sql: "alter table stock_verifications add constraint stock_verifications_counter_id_fkey foreign key (counter_id) references counters (id)",
            },
        ],
    },
];

pub fn auxiliary_table_count() -> usize {
    TABLES
        .iter()
        .filter(|t| t.stage == Stage::Auxiliary)
        .count()
}

/// Plans and applies DDL for one tenant database. Existence is checked via
/// catalog introspection; nothing relies on catching duplicate-object errors.
#[derive(Clone, Debug)]
pub struct SchemaManager {
    pool: PgPool,
}

impl SchemaManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn plan(&self) -> Result<SchemaPlan> {
        self.plan_stage(None).await
    }

    pub(crate) async fn plan_stage(&self, stage: Option<Stage>) -> Result<SchemaPlan> {
        let existing_tables = self.existing_tables().await?;
        let existing_indexes = self.existing_indexes().await?;
        let existing_foreign_keys = self.existing_foreign_keys().await?;

        let mut plan = SchemaPlan::default();
        let mut planned_tables: HashSet<&str> = HashSet::new();

        for table in TABLES {
            if stage.is_some_and(|s| table.stage != s) {
                continue;
            }

            let table_missing = !existing_tables.contains(table.name);
            if table_missing {
                plan.push_action(
                    SchemaActionKind::Table,
                    table.name,
                    format!("create table {}", table.name),
                    table.create_sql.to_string(),
                );
                planned_tables.insert(table.name);
            }

            for index in table.indexes {
                if table_missing || !existing_indexes.contains(index.name) {
                    plan.push_action(
                        SchemaActionKind::Index,
                        index.name,
                        format!("create index {}", index.name),
                        index.create_sql.to_string(),
                    );
                }
            }

            for fk in table.foreign_keys {
                if !table_missing && existing_foreign_keys.contains(fk.name) {
                    continue;
                }
                let referent_ready = existing_tables.contains(fk.references)
                    || planned_tables.contains(fk.references);
                if referent_ready {
                    plan.push_action(
                        SchemaActionKind::ForeignKey,
                        fk.name,
                        format!("add constraint {}", fk.name),
                        fk.create_sql.to_string(),
                    );
                } else {
                    plan.push_warning(format!(
                        "skipping constraint {}: referenced table {} does not exist",
                        fk.name, fk.references
                    ));
                }
            }
        }

        Ok(plan)
    }

    /// Executes the plan in a single transaction under a generous statement
    /// timeout (DDL on a large tenant can legitimately take minutes).
    pub async fn apply(&self, plan: &SchemaPlan, ddl_timeout: Duration) -> Result<()> {
        if plan.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let timeout_stmt = format!("set local statement_timeout = {}", ddl_timeout.as_millis());
        sqlx::query(&timeout_stmt).execute(&mut *tx).await?;
        for action in plan.actions() {
            sqlx::query(action.sql()).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn sync(&self, ddl_timeout: Duration) -> Result<SchemaPlan> {
        let plan = self.plan().await?;
        if !plan.is_empty() {
            self.apply(&plan, ddl_timeout).await?;
        }
        Ok(plan)
    }

    pub(crate) async fn sync_stage(&self, stage: Stage, ddl_timeout: Duration) -> Result<SchemaPlan> {
        let plan = self.plan_stage(Some(stage)).await?;
        if !plan.is_empty() {
            self.apply(&plan, ddl_timeout).await?;
        }
        Ok(plan)
    }

    async fn existing_tables(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "select table_name from information_schema.tables where table_schema = 'public'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn existing_indexes(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "select indexname from pg_indexes where schemaname = 'public'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn existing_foreign_keys(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "select constraint_name from information_schema.table_constraints
             where table_schema = 'public' and constraint_type = 'FOREIGN KEY'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[derive(Clone, Debug, Default)]
pub struct SchemaPlan {
    actions: Vec<SchemaAction>,
    warnings: Vec<String>,
}

impl SchemaPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[SchemaAction] {
        &self.actions
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn count(&self, kind: SchemaActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// Object names of the pending actions of one kind, in plan order.
    pub fn objects(&self, kind: SchemaActionKind) -> Vec<String> {
        self.actions
            .iter()
            .filter(|a| a.kind == kind)
            .map(|a| a.object.clone())
            .collect()
    }

    fn push_action(
        &mut self,
        kind: SchemaActionKind,
        object: &'static str,
        description: String,
        sql: String,
    ) {
        self.actions.push(SchemaAction {
            kind,
            object: object.to_string(),
            description,
            sql,
        });
    }

    fn push_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaActionKind {
    Table,
    Index,
    ForeignKey,
}

#[derive(Clone, Debug)]
pub struct SchemaAction {
    kind: SchemaActionKind,
    object: String,
    description: String,
    sql: String,
}

impl SchemaAction {
    pub fn kind(&self) -> SchemaActionKind {
        self.kind
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

pub fn quote_ident(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn quote_handles_quotes() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn catalog_names_are_unique() {
        let mut tables = HashSet::new();
        let mut objects = HashSet::new();
        for table in TABLES {
            assert!(tables.insert(table.name), "duplicate table {}", table.name);
            for index in table.indexes {
                assert!(objects.insert(index.name), "duplicate index {}", index.name);
            }
            for fk in table.foreign_keys {
                assert!(objects.insert(fk.name), "duplicate constraint {}", fk.name);
            }
        }
    }

    #[test]
    fn foreign_keys_reference_earlier_tables() {
        let position: HashMap<&str, usize> = TABLES
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name, i))
            .collect();
        for (i, table) in TABLES.iter().enumerate() {
            for fk in table.foreign_keys {
                let referent = position
                    .get(fk.references)
                    .unwrap_or_else(|| panic!("{} references unknown table", fk.name));
                assert!(
                    *referent < i,
                    "{} must come after its referent {}",
                    table.name,
                    fk.references
                );
            }
        }
    }

    #[test]
    fn auxiliary_whitelist_is_fixed() {
        assert_eq!(auxiliary_table_count(), 5);
        let aux: Vec<&str> = TABLES
            .iter()
            .filter(|t| t.stage == Stage::Auxiliary)
            .map(|t| t.name)
            .collect();
        assert_eq!(
            aux,
            [
                "rfid_tags",
                "rfid_scan_sessions",
                "rfid_scan_events",
                "daily_branch_balances",
                "stock_verifications"
            ]
        );
    }

    #[test]
    fn baseline_precedes_auxiliary() {
        let first_aux = TABLES
            .iter()
            .position(|t| t.stage == Stage::Auxiliary)
            .expect("catalog has auxiliary tables");
        assert!(
            TABLES[..first_aux].iter().all(|t| t.stage == Stage::Baseline),
            "baseline tables must precede auxiliary tables"
        );
    }
}
