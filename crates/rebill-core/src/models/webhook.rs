use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Webhook processing status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "webhook_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Received,
    Processing,
    Processed,
    Failed,
}

/// Webhook envelope.
///
/// Inserted before any processing; the unique constraint on `event_id`
/// provides at-most-once dispatch across duplicate deliveries. The raw
/// payload is kept for operator replay.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookEnvelope {
    pub id: Uuid,
    pub app_id: String,
    pub event_id: String,
    pub event_type: String,
    pub status: WebhookStatus,
    pub attempts: i32,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
