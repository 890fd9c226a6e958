use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Charge status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "charge_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One-time charge.
///
/// A committed `pending` row is the authoritative evidence that the
/// business operation was attempted; `psp_charge_id` is evidence that
/// the processor accepted it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Charge {
    pub id: Uuid,
    pub app_id: String,
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub invoice_id: Option<String>,
    pub psp_charge_id: Option<String>,
    pub status: ChargeStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub reference_id: Option<String>,
    pub service_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One-time charge request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateChargeRequest {
    pub customer_id: Option<Uuid>,

    /// Alternative customer lookup by the caller's own identifier
    #[validate(length(min = 1, max = 255))]
    pub external_customer_id: Option<String>,

    pub amount_cents: i64,

    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,

    #[validate(length(max = 255))]
    pub reason: Option<String>,

    /// Caller-chosen domain-idempotency key; required and non-empty
    #[validate(length(min = 1, max = 255))]
    pub reference_id: String,

    pub service_date: Option<NaiveDate>,

    #[validate(length(max = 2000))]
    pub note: Option<String>,

    pub metadata: Option<serde_json::Value>,
}
