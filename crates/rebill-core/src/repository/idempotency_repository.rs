//! Idempotency Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::models::IdempotencyRecord;
use crate::Result;

use super::map_unique;

/// Idempotency repository trait
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Look up an unexpired record
    async fn find(&self, app_id: &str, key: &str, now: DateTime<Utc>)
        -> Result<Option<IdempotencyRecord>>;

    /// Insert a completed record. A duplicate `(app_id, key)` maps to
    /// `Error::Conflict`; the loser of the race re-reads the winner.
    async fn insert(&self, record: &IdempotencyRecord) -> Result<()>;

    /// Drop expired records; returns how many were removed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// PostgreSQL implementation of IdempotencyRepository
pub struct PgIdempotencyRepository {
    pool: Pool<Postgres>,
}

impl PgIdempotencyRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for PgIdempotencyRepository {
    async fn find(
        &self,
        app_id: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            "SELECT * FROM idempotency_records WHERE app_id = $1 AND key = $2 AND expires_at > $3",
        )
        .bind(app_id)
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert(&self, record: &IdempotencyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_records
                (app_id, key, request_hash, status_code, response_body, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.app_id)
        .bind(&record.key)
        .bind(&record.request_hash)
        .bind(record.status_code)
        .bind(&record.response_body)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "idempotency key already recorded"))?;

        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
