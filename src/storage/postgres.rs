//! Postgres-backed store.
//!
//! Stale claims rely on `FOR UPDATE SKIP LOCKED`: a row locked by one
//! claimant is invisible to the others, and once the claim commits the row's
//! `updated_at` is past every running sweep's cutoff.

use super::{ContentStore, StorageError, StorageResult, VerificationStore};
use crate::verification::{CategoryResult, NewVerification, Verification, VerificationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS verifications (
        id                   TEXT PRIMARY KEY,
        inn                  TEXT NOT NULL,
        status               TEXT NOT NULL,
        author_email         TEXT NOT NULL,
        company_id           TEXT,
        requested_data_types TEXT[] NOT NULL DEFAULT '{}',
        claimed_by           TEXT,
        claimed_at           TIMESTAMPTZ,
        created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    r"CREATE INDEX IF NOT EXISTS verifications_status_updated_idx
        ON verifications (status, updated_at)",
    r"CREATE TABLE IF NOT EXISTS verification_data_cache (
        data_hash  TEXT PRIMARY KEY,
        data       BYTEA NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    r"CREATE TABLE IF NOT EXISTS verification_data (
        verification_id TEXT NOT NULL REFERENCES verifications (id),
        data_type       TEXT NOT NULL,
        data_hash       TEXT NOT NULL REFERENCES verification_data_cache (data_hash),
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (verification_id, data_type)
    )",
];

const VERIFICATION_COLUMNS: &str = "id, inn, status, author_email, company_id, \
    requested_data_types, claimed_by, claimed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: String,
    inn: String,
    status: String,
    author_email: String,
    company_id: Option<String>,
    requested_data_types: Vec<String>,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for Verification {
    type Error = StorageError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<VerificationStatus>()
            .map_err(|e| StorageError::Corrupt(format!("verification {}: {e}", row.id)))?;
        Ok(Self {
            id: row.id,
            tax_id: row.inn,
            company_id: row.company_id,
            status,
            requested_categories: row.requested_data_types,
            author_email: row.author_email,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    verification_id: String,
    data_type: String,
    data_hash: String,
    created_at: DateTime<Utc>,
}

fn status_names(statuses: &[VerificationStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `url` with at most `max_connections` pooled connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!("Connected to Postgres (max_connections={max_connections})");
        Ok(Self { pool })
    }

    /// Create tables and indexes that do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Database schema ready");
        Ok(())
    }

    /// Explain a zero-row status update.
    async fn rejected_transition(&self, id: &str, to: VerificationStatus) -> StorageError {
        match self.get(id).await {
            Ok(current) => StorageError::InvalidTransition {
                id: id.to_string(),
                from: current.status,
                to,
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl VerificationStore for PgStore {
    async fn create(&self, new: &NewVerification) -> StorageResult<Option<Verification>> {
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            "INSERT INTO verifications (id, inn, status, author_email, requested_data_types)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING
             RETURNING {VERIFICATION_COLUMNS}"
        ))
        .bind(&new.id)
        .bind(&new.tax_id)
        .bind(VerificationStatus::Created.as_str())
        .bind(&new.author_email)
        .bind(new.requested_categories.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Verification::try_from).transpose()
    }

    async fn get(&self, id: &str) -> StorageResult<Verification> {
        sqlx::query_as::<_, VerificationRow>(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::verification_not_found(id))
        .and_then(Verification::try_from)
    }

    async fn transition(&self, id: &str, to: VerificationStatus) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE verifications SET status = $1, updated_at = NOW()
             WHERE id = $2 AND status = ANY($3)",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(status_names(to.predecessors()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejected_transition(id, to).await);
        }
        debug!(verification_id = id, status = %to, "Verification status updated");
        Ok(())
    }

    async fn mark_processing(&self, id: &str, company_id: &str) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE verifications SET status = $1, company_id = $2, updated_at = NOW()
             WHERE id = $3 AND status = $4",
        )
        .bind(VerificationStatus::Processing.as_str())
        .bind(company_id)
        .bind(id)
        .bind(VerificationStatus::Searching.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .rejected_transition(id, VerificationStatus::Processing)
                .await);
        }
        Ok(())
    }

    async fn upsert_result(&self, id: &str, category: &str, digest: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO verification_data (verification_id, data_type, data_hash, created_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (verification_id, data_type) DO UPDATE SET
                 data_hash = EXCLUDED.data_hash,
                 created_at = NOW()",
        )
        .bind(id)
        .bind(category)
        .bind(digest)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn results(&self, id: &str) -> StorageResult<Vec<CategoryResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(
            "SELECT verification_id, data_type, data_hash, created_at
             FROM verification_data WHERE verification_id = $1 ORDER BY data_type",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryResult {
                verification_id: row.verification_id,
                category: row.data_type,
                digest: row.data_hash,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn claim_stale(
        &self,
        claimant: &str,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Option<Verification>> {
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            "UPDATE verifications
             SET claimed_by = $1, claimed_at = NOW(), updated_at = NOW()
             WHERE id = (
                 SELECT id FROM verifications
                 WHERE status = ANY($2) AND updated_at < $3
                 ORDER BY updated_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {VERIFICATION_COLUMNS}"
        ))
        .bind(claimant)
        .bind(status_names(&VerificationStatus::NON_TERMINAL))
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Verification::try_from).transpose()
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn contains(&self, digest: &str) -> StorageResult<bool> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM verification_data_cache WHERE data_hash = $1")
                .bind(digest)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn insert_if_absent(&self, digest: &str, data: &[u8]) -> StorageResult<bool> {
        let result = sqlx::query(
            "INSERT INTO verification_data_cache (data_hash, data, created_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (data_hash) DO NOTHING",
        )
        .bind(digest)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn load(&self, digest: &str) -> StorageResult<Option<Vec<u8>>> {
        let data: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM verification_data_cache WHERE data_hash = $1")
                .bind(digest)
                .fetch_optional(&self.pool)
                .await?;
        Ok(data)
    }
}
