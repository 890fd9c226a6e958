//! Subscription model for recurring billing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::payment_method::PaymentMethodType;

/// Subscription status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created but first payment not yet confirmed
    Incomplete,
    /// First payment window elapsed without confirmation
    IncompleteExpired,
    /// Trial period before billing starts
    Trialing,
    /// Active and billing
    Active,
    /// Payment failed, in the retry window
    PastDue,
    /// Canceled
    Canceled,
    /// Retries exhausted without payment
    Unpaid,
    /// Paused temporarily
    Paused,
}

impl SubscriptionStatus {
    /// Statuses that grant access to the subscribed product.
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

/// Billing interval unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "interval_unit", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

/// Subscription entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub app_id: String,
    pub customer_id: Uuid,
    pub psp_subscription_id: Option<String>,
    pub plan_id: String,
    pub plan_name: String,
    pub price_cents: i64,
    pub status: SubscriptionStatus,
    pub interval_unit: IntervalUnit,
    pub interval_count: i32,
    pub billing_cycle_anchor: Option<DateTime<Utc>>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub cancel_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub payment_method_token: String,
    pub payment_method_type: PaymentMethodType,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create subscription request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub customer_id: Uuid,

    #[validate(length(min = 1, max = 128))]
    pub plan_id: String,

    #[validate(length(min = 1, max = 255))]
    pub plan_name: String,

    pub price_cents: i64,
    pub interval_unit: IntervalUnit,

    #[validate(range(min = 1, max = 12))]
    pub interval_count: Option<i32>,

    /// Falls back to the customer's default payment method
    pub payment_method_token: Option<String>,

    pub billing_cycle_anchor: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// Update subscription request.
///
/// Only these fields may change on an existing subscription; interval
/// mutations go through the change-cycle flow instead.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateSubscriptionRequest {
    #[validate(length(min = 1, max = 128))]
    pub plan_id: Option<String>,

    #[validate(length(min = 1, max = 255))]
    pub plan_name: Option<String>,

    pub price_cents: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Cancel subscription request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSubscriptionRequest {
    /// When true, the subscription stays active until the period closes
    #[serde(default)]
    pub at_period_end: bool,
}

/// Change billing cycle (monthly <-> annual) request.
///
/// The PSP does not permit interval mutation, so this is executed as
/// create-new + cancel-old.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangeCycleRequest {
    pub customer_id: Uuid,
    pub from_subscription_id: Uuid,

    #[validate(length(min = 1, max = 128))]
    pub new_plan_id: String,

    #[validate(length(min = 1, max = 255))]
    pub new_plan_name: Option<String>,

    pub price_cents: i64,
    pub interval_unit: IntervalUnit,

    #[validate(range(min = 1, max = 12))]
    pub interval_count: Option<i32>,

    pub payment_method_token: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
