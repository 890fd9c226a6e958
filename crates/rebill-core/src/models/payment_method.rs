use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Payment method type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_method_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    AchDebit,
    EftDebit,
}

/// Tokenized payment method.
///
/// Stores only masked data; the full instrument never reaches this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub app_id: String,
    pub customer_id: Uuid,
    pub psp_payment_method_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub method_type: PaymentMethodType,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub bank_name: Option<String>,
    pub bank_last4: Option<String>,
    pub is_default: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attach an already-tokenized payment method to a customer
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddPaymentMethodRequest {
    pub customer_id: Uuid,

    /// Opaque token from the PSP's hosted fields (`pm_...`)
    #[validate(length(min = 1, max = 255))]
    pub payment_method_token: String,

    pub set_default: Option<bool>,
}
