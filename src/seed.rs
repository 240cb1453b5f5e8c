use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::Result;

/// Fixed reference catalog every fresh tenant starts with. Seeding is guarded
/// per table: rows are inserted only when the table is empty, so re-running
/// the seed never duplicates anything.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("Gold", "7113"),
    ("Silver", "7114"),
    ("Diamond", "7102"),
    ("Platinum", "7115"),
    ("Gemstone", "7103"),
];

pub const PRODUCT_TYPES: &[&str] = &["Ring", "Necklace", "Bangle", "Earring"];

pub const DESIGNS: &[&str] = &["Classic", "Antique", "Temple", "Modern"];

pub const PURITIES: &[(&str, f64)] = &[
    ("24K 999", 99.90),
    ("22K 916", 91.60),
    ("18K 750", 75.00),
    ("14K 585", 58.50),
    ("Silver 925", 92.50),
];

pub const BRANCHES: &[(&str, &str)] = &[
    ("BR01", "Main Showroom"),
    ("BR02", "City Centre"),
    ("BR03", "Exhibition"),
];

/// (branch code, counter code, counter name)
pub const COUNTERS: &[(&str, &str, &str)] = &[
    ("BR01", "C1", "Gold Counter"),
    ("BR01", "C2", "Silver Counter"),
    ("BR02", "C1", "Gold Counter"),
    ("BR03", "C1", "Exhibition Counter"),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub categories: usize,
    pub product_types: usize,
    pub designs: usize,
    pub purities: usize,
    pub branches: usize,
    pub counters: usize,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.categories
            + self.product_types
            + self.designs
            + self.purities
            + self.branches
            + self.counters
    }
}

pub async fn seed_reference_data(pool: &PgPool) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    if is_empty(pool, "categories").await? {
        for (name, hsn_code) in CATEGORIES {
            sqlx::query("insert into categories (id, name, hsn_code) values ($1, $2, $3)")
                .bind(Uuid::new_v4())
                .bind(name)
                .bind(hsn_code)
                .execute(pool)
                .await?;
            report.categories += 1;
        }
    }

    if is_empty(pool, "product_types").await? {
        for name in PRODUCT_TYPES {
            sqlx::query("insert into product_types (id, name) values ($1, $2)")
                .bind(Uuid::new_v4())
                .bind(name)
                .execute(pool)
                .await?;
            report.product_types += 1;
        }
    }

    if is_empty(pool, "designs").await? {
        for name in DESIGNS {
            sqlx::query("insert into designs (id, name) values ($1, $2)")
                .bind(Uuid::new_v4())
                .bind(name)
                .execute(pool)
                .await?;
            report.designs += 1;
        }
    }

    if is_empty(pool, "purities").await? {
        for (name, fineness) in PURITIES {
            sqlx::query("insert into purities (id, name, fineness) values ($1, $2, $3)")
                .bind(Uuid::new_v4())
                .bind(name)
                .bind(fineness)
                .execute(pool)
                .await?;
            report.purities += 1;
        }
    }

    if is_empty(pool, "branches").await? {
        for (code, name) in BRANCHES {
            sqlx::query("insert into branches (id, code, name) values ($1, $2, $3)")
                .bind(Uuid::new_v4())
                .bind(code)
                .bind(name)
                .execute(pool)
                .await?;
            report.branches += 1;
        }
    }

    if is_empty(pool, "counters").await? {
        for (branch_code, code, name) in COUNTERS {
            let branch_id: Uuid =
                sqlx::query_scalar("select id from branches where code = $1")
                    .bind(branch_code)
                    .fetch_one(pool)
                    .await?;
            sqlx::query(
                "insert into counters (id, branch_id, code, name) values ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(branch_id)
            .bind(code)
            .bind(name)
            .execute(pool)
            .await?;
            report.counters += 1;
        }
    }

    if report.total() > 0 {
        info!(rows = report.total(), "reference data seeded");
    }
    Ok(report)
}

async fn is_empty(pool: &PgPool, table: &'static str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(&format!("select count(*) from {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_attach_to_seeded_branches() {
        for (branch_code, _, _) in COUNTERS {
            assert!(
                BRANCHES.iter().any(|(code, _)| code == branch_code),
                "counter references unseeded branch {branch_code}"
            );
        }
    }

    #[test]
    fn default_catalog_counts() {
        assert_eq!(CATEGORIES.len(), 5);
        assert_eq!(PRODUCT_TYPES.len(), 4);
        assert_eq!(DESIGNS.len(), 4);
        assert_eq!(PURITIES.len(), 5);
        assert_eq!(BRANCHES.len(), 3);
        assert_eq!(COUNTERS.len(), 4);
    }
}
