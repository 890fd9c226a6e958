//! Dispute Repository
//!
//! Disputes only enter the system through the webhook pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::Dispute;
use crate::Result;

/// Upsert payload carried by dispute webhooks
#[derive(Debug, Clone)]
pub struct DisputeUpsert {
    pub customer_id: Uuid,
    pub charge_id: Uuid,
    pub psp_dispute_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub evidence_due_by: Option<DateTime<Utc>>,
}

/// Dispute repository trait
#[async_trait]
pub trait DisputeRepository: Send + Sync {
    /// Idempotent upsert keyed by `(app_id, psp_dispute_id)`
    async fn upsert_by_psp_id(&self, app_id: &str, dispute: &DisputeUpsert) -> Result<Dispute>;

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Dispute>>;

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Dispute>>;
}

/// PostgreSQL implementation of DisputeRepository
pub struct PgDisputeRepository {
    pool: Pool<Postgres>,
}

impl PgDisputeRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DisputeRepository for PgDisputeRepository {
    async fn upsert_by_psp_id(&self, app_id: &str, dispute: &DisputeUpsert) -> Result<Dispute> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            INSERT INTO disputes
                (app_id, customer_id, charge_id, psp_dispute_id, status, amount_cents,
                 currency, reason, evidence_due_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (app_id, psp_dispute_id) DO UPDATE
            SET status = EXCLUDED.status,
                amount_cents = EXCLUDED.amount_cents,
                reason = COALESCE(EXCLUDED.reason, disputes.reason),
                evidence_due_by = COALESCE(EXCLUDED.evidence_due_by, disputes.evidence_due_by),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(dispute.customer_id)
        .bind(dispute.charge_id)
        .bind(&dispute.psp_dispute_id)
        .bind(&dispute.status)
        .bind(dispute.amount_cents)
        .bind(&dispute.currency)
        .bind(&dispute.reason)
        .bind(dispute.evidence_due_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(dispute)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Dispute>> {
        let dispute =
            sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE app_id = $1 AND id = $2")
                .bind(app_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(dispute)
    }

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Dispute>> {
        let disputes = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT * FROM disputes
            WHERE app_id = $1 AND ($2::uuid IS NULL OR customer_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(app_id)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(disputes)
    }
}
