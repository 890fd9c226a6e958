use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::payment_method::PaymentMethodType;

/// Customer status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "customer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Delinquent,
    Deleted,
}

impl Default for CustomerStatus {
    fn default() -> Self {
        CustomerStatus::Active
    }
}

/// Customer entity
///
/// `default_payment_method_token` is a denormalized fast path; the
/// authoritative default is the `is_default` flag on payment methods,
/// updated in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub app_id: String,
    pub external_customer_id: Option<String>,
    pub psp_customer_id: Option<String>,
    pub email: String,
    pub name: String,
    pub default_payment_method_token: Option<String>,
    pub default_payment_method_type: Option<PaymentMethodType>,
    pub status: CustomerStatus,
    pub delinquent_since: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Jurisdiction for tax purposes: explicit `jurisdiction_code` in
    /// metadata wins, then `state`.
    pub fn jurisdiction_code(&self) -> Option<String> {
        self.metadata
            .get("jurisdiction_code")
            .or_else(|| self.metadata.get("state"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Customer segment derived from metadata (used by coupon eligibility).
    pub fn segment(&self) -> Option<String> {
        self.metadata
            .get("segment")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// True when metadata carries a tax exemption matching the given type.
    pub fn is_tax_exempt(&self, tax_type: &str) -> bool {
        match self.metadata.get("tax_exemptions") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .any(|t| t.eq_ignore_ascii_case(tax_type)),
            _ => false,
        }
    }
}

/// Create customer request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(min = 1, max = 255))]
    pub external_customer_id: Option<String>,

    pub metadata: Option<serde_json::Value>,
}

/// Update customer request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateCustomerRequest {
    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    pub metadata: Option<serde_json::Value>,
}

/// Set default payment method request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetDefaultPaymentMethodRequest {
    #[validate(length(min = 1, max = 255))]
    pub payment_method_token: String,
}
