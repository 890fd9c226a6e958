use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Refund status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "refund_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Refund against a settled charge
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Refund {
    pub id: Uuid,
    pub app_id: String,
    pub customer_id: Uuid,
    pub charge_id: Uuid,
    pub psp_refund_id: Option<String>,
    pub status: RefundStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub reference_id: String,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Refund request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRefundRequest {
    pub charge_id: Uuid,

    pub amount_cents: i64,

    #[validate(length(max = 255))]
    pub reason: Option<String>,

    /// Caller-chosen domain-idempotency key; required and non-empty
    #[validate(length(min = 1, max = 255))]
    pub reference_id: String,

    pub metadata: Option<serde_json::Value>,
}
