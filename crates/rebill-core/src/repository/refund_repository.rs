//! Refund Repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{Refund, RefundStatus};
use crate::{Error, Result};

use super::map_unique;

/// Insert payload for a pending refund row
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub customer_id: Uuid,
    pub charge_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub reference_id: String,
    pub metadata: serde_json::Value,
}

/// Refund repository trait
#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Insert a `pending` row. A duplicate `(app_id, reference_id)` maps
    /// to `Error::Conflict`; the caller recovers by re-reading.
    async fn insert_pending(&self, app_id: &str, refund: &NewRefund) -> Result<Refund>;

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Refund>>;

    async fn find_by_reference(&self, app_id: &str, reference_id: &str)
        -> Result<Option<Refund>>;

    async fn list(&self, app_id: &str, charge_id: Option<Uuid>) -> Result<Vec<Refund>>;

    async fn mark_succeeded(&self, app_id: &str, id: Uuid, psp_refund_id: &str)
        -> Result<Refund>;

    async fn mark_failed(
        &self,
        app_id: &str,
        id: Uuid,
        failure_code: &str,
        failure_message: &str,
    ) -> Result<Refund>;

    /// Idempotent webhook sync by PSP id
    async fn sync_status_by_psp_id(
        &self,
        app_id: &str,
        psp_refund_id: &str,
        status: RefundStatus,
    ) -> Result<Option<Refund>>;
}

/// PostgreSQL implementation of RefundRepository
pub struct PgRefundRepository {
    pool: Pool<Postgres>,
}

impl PgRefundRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefundRepository for PgRefundRepository {
    async fn insert_pending(&self, app_id: &str, refund: &NewRefund) -> Result<Refund> {
        let refund = sqlx::query_as::<_, Refund>(
            r#"
            INSERT INTO refunds
                (app_id, customer_id, charge_id, amount_cents, currency, reason,
                 reference_id, metadata, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(refund.customer_id)
        .bind(refund.charge_id)
        .bind(refund.amount_cents)
        .bind(&refund.currency)
        .bind(&refund.reason)
        .bind(&refund.reference_id)
        .bind(&refund.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "refund with this reference_id already exists"))?;

        Ok(refund)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Refund>> {
        let refund =
            sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE app_id = $1 AND id = $2")
                .bind(app_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(refund)
    }

    async fn find_by_reference(
        &self,
        app_id: &str,
        reference_id: &str,
    ) -> Result<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>(
            "SELECT * FROM refunds WHERE app_id = $1 AND reference_id = $2",
        )
        .bind(app_id)
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(refund)
    }

    async fn list(&self, app_id: &str, charge_id: Option<Uuid>) -> Result<Vec<Refund>> {
        let refunds = sqlx::query_as::<_, Refund>(
            r#"
            SELECT * FROM refunds
            WHERE app_id = $1 AND ($2::uuid IS NULL OR charge_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(app_id)
        .bind(charge_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(refunds)
    }

    async fn mark_succeeded(
        &self,
        app_id: &str,
        id: Uuid,
        psp_refund_id: &str,
    ) -> Result<Refund> {
        let refund = sqlx::query_as::<_, Refund>(
            r#"
            UPDATE refunds
            SET status = 'succeeded', psp_refund_id = $3, updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(id)
        .bind(psp_refund_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Refund not found"))?;

        Ok(refund)
    }

    async fn mark_failed(
        &self,
        app_id: &str,
        id: Uuid,
        failure_code: &str,
        failure_message: &str,
    ) -> Result<Refund> {
        let refund = sqlx::query_as::<_, Refund>(
            r#"
            UPDATE refunds
            SET status = 'failed', failure_code = $3, failure_message = $4, updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(id)
        .bind(failure_code)
        .bind(failure_message)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Refund not found"))?;

        Ok(refund)
    }

    async fn sync_status_by_psp_id(
        &self,
        app_id: &str,
        psp_refund_id: &str,
        status: RefundStatus,
    ) -> Result<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>(
            r#"
            UPDATE refunds
            SET status = $3, updated_at = NOW()
            WHERE app_id = $1 AND psp_refund_id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(psp_refund_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(refund)
    }
}
