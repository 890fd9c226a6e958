//! Webhook Envelope Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::models::{WebhookEnvelope, WebhookStatus};
use crate::{Error, Result};

/// Outcome of the envelope-first insert
#[derive(Debug, Clone)]
pub enum EnvelopeInsert {
    /// First delivery of this event
    Inserted(WebhookEnvelope),
    /// `event_id` already recorded; carries the existing envelope
    Duplicate(WebhookEnvelope),
}

/// Webhook envelope repository trait
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Envelope-first insert: record the event before any processing.
    /// The unique constraint on `event_id` detects duplicate deliveries.
    async fn insert_envelope(
        &self,
        app_id: &str,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<EnvelopeInsert>;

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookEnvelope>>;

    async fn set_status(
        &self,
        event_id: &str,
        status: WebhookStatus,
        error: Option<&str>,
    ) -> Result<()>;

    async fn list(&self, app_id: &str, limit: i64) -> Result<Vec<WebhookEnvelope>>;

    /// Operator replay: reset a failed envelope to `received` and bump
    /// the attempt counter. Returns the stored raw payload.
    async fn reset_for_replay(&self, app_id: &str, event_id: &str) -> Result<WebhookEnvelope>;
}

/// PostgreSQL implementation of WebhookRepository
pub struct PgWebhookRepository {
    pool: Pool<Postgres>,
}

impl PgWebhookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for PgWebhookRepository {
    async fn insert_envelope(
        &self,
        app_id: &str,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<EnvelopeInsert> {
        let inserted = sqlx::query_as::<_, WebhookEnvelope>(
            r#"
            INSERT INTO webhook_envelopes (app_id, event_id, event_type, payload, status, attempts)
            VALUES ($1, $2, $3, $4, 'received', 1)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(envelope) => Ok(EnvelopeInsert::Inserted(envelope)),
            None => {
                let existing = self
                    .find_by_event_id(event_id)
                    .await?
                    .ok_or_else(|| Error::internal("envelope vanished after conflict"))?;
                Ok(EnvelopeInsert::Duplicate(existing))
            }
        }
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookEnvelope>> {
        let envelope = sqlx::query_as::<_, WebhookEnvelope>(
            "SELECT * FROM webhook_envelopes WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(envelope)
    }

    async fn set_status(
        &self,
        event_id: &str,
        status: WebhookStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_envelopes
            SET status = $2,
                error = $3,
                processed_at = CASE WHEN $2 = 'processed'::webhook_status THEN NOW()
                                    ELSE processed_at END
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(status)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, app_id: &str, limit: i64) -> Result<Vec<WebhookEnvelope>> {
        let envelopes = sqlx::query_as::<_, WebhookEnvelope>(
            r#"
            SELECT * FROM webhook_envelopes
            WHERE app_id = $1
            ORDER BY received_at DESC
            LIMIT $2
            "#,
        )
        .bind(app_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(envelopes)
    }

    async fn reset_for_replay(&self, app_id: &str, event_id: &str) -> Result<WebhookEnvelope> {
        let envelope = sqlx::query_as::<_, WebhookEnvelope>(
            r#"
            UPDATE webhook_envelopes
            SET status = 'received', error = NULL, attempts = attempts + 1
            WHERE app_id = $1 AND event_id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Webhook event not found"))?;

        Ok(envelope)
    }
}
