//! Charge Repository

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{Charge, ChargeStatus};
use crate::{Error, Result};

use super::map_unique;

/// Insert payload for a pending charge row
#[derive(Debug, Clone)]
pub struct NewCharge {
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub reference_id: Option<String>,
    pub service_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub metadata: serde_json::Value,
}

/// Charge repository trait
#[async_trait]
pub trait ChargeRepository: Send + Sync {
    /// Insert a `pending` row. A duplicate `(app_id, reference_id)` maps
    /// to `Error::Conflict`; the caller recovers by re-reading.
    async fn insert_pending(&self, app_id: &str, charge: &NewCharge) -> Result<Charge>;

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Charge>>;

    async fn find_by_reference(&self, app_id: &str, reference_id: &str)
        -> Result<Option<Charge>>;

    async fn find_by_psp_id(&self, app_id: &str, psp_charge_id: &str) -> Result<Option<Charge>>;

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Charge>>;

    async fn mark_succeeded(&self, app_id: &str, id: Uuid, psp_charge_id: &str)
        -> Result<Charge>;

    async fn mark_failed(
        &self,
        app_id: &str,
        id: Uuid,
        failure_code: &str,
        failure_message: &str,
    ) -> Result<Charge>;

    /// Idempotent webhook sync: update status by PSP id if the charge is
    /// known locally.
    async fn sync_status_by_psp_id(
        &self,
        app_id: &str,
        psp_charge_id: &str,
        status: ChargeStatus,
        failure_code: Option<&str>,
        failure_message: Option<&str>,
    ) -> Result<Option<Charge>>;
}

/// PostgreSQL implementation of ChargeRepository
pub struct PgChargeRepository {
    pool: Pool<Postgres>,
}

impl PgChargeRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChargeRepository for PgChargeRepository {
    async fn insert_pending(&self, app_id: &str, charge: &NewCharge) -> Result<Charge> {
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            INSERT INTO charges
                (app_id, customer_id, subscription_id, amount_cents, currency, reason,
                 reference_id, service_date, note, metadata, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(charge.customer_id)
        .bind(charge.subscription_id)
        .bind(charge.amount_cents)
        .bind(&charge.currency)
        .bind(&charge.reason)
        .bind(&charge.reference_id)
        .bind(charge.service_date)
        .bind(&charge.note)
        .bind(&charge.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "charge with this reference_id already exists"))?;

        Ok(charge)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Charge>> {
        let charge =
            sqlx::query_as::<_, Charge>("SELECT * FROM charges WHERE app_id = $1 AND id = $2")
                .bind(app_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(charge)
    }

    async fn find_by_reference(
        &self,
        app_id: &str,
        reference_id: &str,
    ) -> Result<Option<Charge>> {
        let charge = sqlx::query_as::<_, Charge>(
            "SELECT * FROM charges WHERE app_id = $1 AND reference_id = $2",
        )
        .bind(app_id)
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(charge)
    }

    async fn find_by_psp_id(&self, app_id: &str, psp_charge_id: &str) -> Result<Option<Charge>> {
        let charge = sqlx::query_as::<_, Charge>(
            "SELECT * FROM charges WHERE app_id = $1 AND psp_charge_id = $2",
        )
        .bind(app_id)
        .bind(psp_charge_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(charge)
    }

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Charge>> {
        let charges = sqlx::query_as::<_, Charge>(
            r#"
            SELECT * FROM charges
            WHERE app_id = $1 AND ($2::uuid IS NULL OR customer_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(app_id)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(charges)
    }

    async fn mark_succeeded(
        &self,
        app_id: &str,
        id: Uuid,
        psp_charge_id: &str,
    ) -> Result<Charge> {
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE charges
            SET status = 'succeeded', psp_charge_id = $3, updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(id)
        .bind(psp_charge_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Charge not found"))?;

        Ok(charge)
    }

    async fn mark_failed(
        &self,
        app_id: &str,
        id: Uuid,
        failure_code: &str,
        failure_message: &str,
    ) -> Result<Charge> {
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE charges
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
        .ok_or_else(|| Error::not_found("Charge not found"))?;

        Ok(charge)
    }

    async fn sync_status_by_psp_id(
        &self,
        app_id: &str,
        psp_charge_id: &str,
        status: ChargeStatus,
        failure_code: Option<&str>,
        failure_message: Option<&str>,
    ) -> Result<Option<Charge>> {
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE charges
            SET status = $3,
                failure_code = COALESCE($4, failure_code),
                failure_message = COALESCE($5, failure_message),
                updated_at = NOW()
            WHERE app_id = $1 AND psp_charge_id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(psp_charge_id)
        .bind(status)
        .bind(failure_code)
        .bind(failure_message)
        .fetch_optional(&self.pool)
        .await?;

        Ok(charge)
    }
}
