use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Dispute raised by the cardholder's bank.
///
/// Disputes are created and updated only by the webhook pipeline; the
/// status string is the PSP's own vocabulary and is stored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub app_id: String,
    pub customer_id: Uuid,
    pub charge_id: Uuid,
    pub psp_dispute_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub evidence_due_by: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
