//! PSP adapter
//!
//! Thin, typed wrapper around the external payment processor. The rest of
//! the system only sees tokenized artifacts (`cus_...`, `pm_...`,
//! `sub_...`, `ch_...`) and the typed results below; raw SDK/HTTP errors
//! never escape this module. Every failure surfaces as
//! `Error::PaymentProcessor { code, message }` with the PSP's own error
//! code, safe to expose to callers.

pub mod tilled;

pub use tilled::TilledClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::models::PaymentMethodType;
use crate::Result;

/// Tokenized customer at the PSP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PspCustomer {
    pub id: String,
}

/// Masked payment method detail fetched from the PSP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PspPaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: PaymentMethodType,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub bank_name: Option<String>,
    pub bank_last4: Option<String>,
}

/// Subscription handle at the PSP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PspSubscription {
    pub id: String,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Charge result from the PSP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PspCharge {
    pub id: String,
    pub status: String,
}

/// Refund result from the PSP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PspRefund {
    pub id: String,
    pub status: String,
}

/// New subscription parameters sent to the PSP
#[derive(Debug, Clone)]
pub struct PspSubscriptionParams {
    pub customer_id: String,
    pub payment_method_token: String,
    pub plan_id: String,
    pub price_cents: i64,
    pub interval_unit: String,
    pub interval_count: i32,
    pub billing_cycle_anchor: Option<DateTime<Utc>>,
}

/// Payment processor client trait.
///
/// Implementations carry their own concurrency bound and per-call
/// deadline; on exhaustion they return `Error::Backpressure` without
/// issuing the call.
#[async_trait]
pub trait PspClient: Send + Sync {
    /// Create a tokenized customer
    async fn create_customer(
        &self,
        app: &AppConfig,
        email: &str,
        name: &str,
    ) -> Result<PspCustomer>;

    /// Best-effort metadata sync for an existing customer
    async fn update_customer(
        &self,
        app: &AppConfig,
        psp_customer_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<()>;

    /// Attach a tokenized payment method to a customer
    async fn attach_payment_method(
        &self,
        app: &AppConfig,
        psp_customer_id: &str,
        payment_method_token: &str,
    ) -> Result<()>;

    /// Fetch masked display fields for a tokenized method
    async fn get_payment_method(
        &self,
        app: &AppConfig,
        payment_method_token: &str,
    ) -> Result<PspPaymentMethod>;

    /// Detach a payment method (best-effort on delete)
    async fn detach_payment_method(
        &self,
        app: &AppConfig,
        payment_method_token: &str,
    ) -> Result<()>;

    /// Create a subscription
    async fn create_subscription(
        &self,
        app: &AppConfig,
        params: &PspSubscriptionParams,
    ) -> Result<PspSubscription>;

    /// Flag a subscription to cancel when the period closes
    async fn set_cancel_at_period_end(
        &self,
        app: &AppConfig,
        psp_subscription_id: &str,
    ) -> Result<()>;

    /// Cancel a subscription immediately
    async fn cancel_subscription(
        &self,
        app: &AppConfig,
        psp_subscription_id: &str,
    ) -> Result<()>;

    /// Create a one-time charge against a stored payment method
    async fn create_charge(
        &self,
        app: &AppConfig,
        psp_customer_id: &str,
        payment_method_token: &str,
        amount_cents: i64,
        currency: &str,
        reference_id: &str,
    ) -> Result<PspCharge>;

    /// Refund a settled charge
    async fn create_refund(
        &self,
        app: &AppConfig,
        psp_charge_id: &str,
        amount_cents: i64,
        reason: Option<&str>,
    ) -> Result<PspRefund>;
}
