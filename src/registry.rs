use chrono::{DateTime, Utc};
use indoc::indoc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::{Error, Result};

pub const CODE_PREFIX: &str = "LS";
pub const SEED_CODE: &str = "LS0001";

const CODE_SUFFIX_WIDTH: usize = 4;
const REGISTER_ATTEMPTS: usize = 5;

/// One row of the shared catalog. `database_name` stays `None` between
/// registration and successful provisioning; both fields are write-once.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct TenantRecord {
    pub tenant_code: String,
    pub organization_name: String,
    pub database_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The shared catalog mapping tenant codes to database names. Lives in the
/// administrative database, never inside a tenant database.
#[derive(Clone, Debug)]
pub struct Registry {
    pool: PgPool,
}

impl Registry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_catalog(&self) -> Result<()> {
        sqlx::query(indoc! {"
            create table if not exists tenants (
                tenant_code text primary key,
                organization_name text not null,
                database_name text null unique,
                created_at timestamptz not null default now()
            )
        "})
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<TenantRecord>> {
        let rows = sqlx::query_as::<_, TenantRecord>(
            "select tenant_code, organization_name, database_name, created_at
             from tenants order by tenant_code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, tenant_code: &str) -> Result<Option<TenantRecord>> {
        let row = sqlx::query_as::<_, TenantRecord>(
            "select tenant_code, organization_name, database_name, created_at
             from tenants where tenant_code = $1",
        )
        .bind(tenant_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Inserts a fresh registry row. A concurrent onboarding that claimed the
    /// same code surfaces as `CodeConflict` via the primary-key constraint.
    pub async fn insert(&self, tenant_code: &str, organization_name: &str) -> Result<()> {
        let result = sqlx::query(
            "insert into tenants (tenant_code, organization_name) values ($1, $2)",
        )
        .bind(tenant_code)
        .bind(organization_name)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = Error::from(e);
                if err.is_unique_violation() {
                    Err(Error::CodeConflict(tenant_code.to_string()))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Records the physical database for a tenant. Write-once: refuses to
    /// overwrite an already-assigned name.
    pub async fn set_database_name(&self, tenant_code: &str, database_name: &str) -> Result<()> {
        let updated = sqlx::query(
            "update tenants set database_name = $2
             where tenant_code = $1 and database_name is null",
        )
        .bind(tenant_code)
        .bind(database_name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(());
        }
        match self.get(tenant_code).await? {
            Some(record) if record.database_name.is_some() => {
                Err(Error::DatabaseNameAssigned(tenant_code.to_string()))
            }
            Some(_) => Err(Error::TenantNotFound(tenant_code.to_string())),
            None => Err(Error::TenantNotFound(tenant_code.to_string())),
        }
    }

    /// Next free tenant code, derived from the numeric maximum across every
    /// registered code. Malformed legacy codes are skipped, never a reason to
    /// restart the sequence.
    pub async fn next_tenant_code(&self) -> Result<String> {
        let codes = sqlx::query_scalar::<_, String>("select tenant_code from tenants")
            .fetch_all(&self.pool)
            .await?;
        Ok(next_code(codes.iter().map(String::as_str)))
    }

    /// Generate-and-insert loop: a lost race on the unique constraint
    /// recomputes the code and tries again instead of propagating.
    pub async fn register(&self, organization_name: &str) -> Result<String> {
        let mut last_code = String::new();
        for _ in 0..REGISTER_ATTEMPTS {
            let code = self.next_tenant_code().await?;
            match self.insert(&code, organization_name).await {
                Ok(()) => {
                    info!(tenant_code = %code, organization = organization_name, "tenant registered");
                    return Ok(code);
                }
                Err(Error::CodeConflict(code)) => {
                    crate::metrics::record_code_conflict();
                    warn!(tenant_code = %code, "tenant code taken by concurrent onboarding, retrying");
                    last_code = code;
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::CodeConflict(last_code))
    }
}

/// Numeric suffix of a well-formed code: fixed prefix plus at least four
/// digits (four is the padded width; suffixes past 9999 simply grow).
pub fn parse_tenant_code(code: &str) -> Option<u32> {
    let digits = code.strip_prefix(CODE_PREFIX)?;
    if digits.len() < CODE_SUFFIX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn format_tenant_code(suffix: u32) -> String {
    format!("{CODE_PREFIX}{suffix:04}")
}

fn next_code<'a>(codes: impl IntoIterator<Item = &'a str>) -> String {
    let mut max: Option<u32> = None;
    for code in codes {
        match parse_tenant_code(code) {
            Some(n) => max = Some(max.map_or(n, |m| m.max(n))),
            None => warn!(tenant_code = %code, "ignoring malformed tenant code"),
        }
    }
    match max {
        Some(n) => format_tenant_code(n + 1),
        None => SEED_CODE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_code_is_the_seed() {
        assert_eq!(next_code(std::iter::empty()), SEED_CODE);
    }

    #[test]
    fn increments_the_true_maximum() {
        assert_eq!(next_code(["LS0001", "LS0002", "LS0005"]), "LS0006");
    }

    #[test]
    fn insertion_order_does_not_matter() {
        // A descending-sort generator would compute LS0003 here.
        assert_eq!(next_code(["LS0010", "LS0002"]), "LS0011");
        assert_eq!(next_code(["LS0002", "LS0010"]), "LS0011");
    }

    #[test]
    fn malformed_codes_are_skipped_not_fatal() {
        assert_eq!(next_code(["garbage", "LS0004", "LS-12"]), "LS0005");
        assert_eq!(next_code(["garbage"]), SEED_CODE);
    }

    #[test]
    fn suffix_grows_past_the_padded_width() {
        assert_eq!(next_code(["LS9999"]), "LS10000");
        assert_eq!(next_code(["LS10000", "LS0007"]), "LS10001");
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        assert_eq!(parse_tenant_code("LS0042"), Some(42));
        assert_eq!(parse_tenant_code("LS10000"), Some(10000));
        assert_eq!(parse_tenant_code("XX0001"), None);
        assert_eq!(parse_tenant_code("LS001"), None);
        assert_eq!(parse_tenant_code("LS00A1"), None);
        assert_eq!(parse_tenant_code(""), None);
    }
}
