//! Tilled HTTP client
//!
//! Concrete `PspClient` over Tilled's REST API. Outbound concurrency is
//! bounded by a semaphore so a PSP slowdown cannot cascade into pool
//! exhaustion; when no permit is available the call fails fast with
//! `Error::Backpressure` (HTTP 503 at the edge).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::config::{AppConfig, PspConfig};
use crate::{Error, Result};

use super::{
    PspCharge, PspClient, PspCustomer, PspPaymentMethod, PspRefund, PspSubscription,
    PspSubscriptionParams,
};

const SANDBOX_BASE_URL: &str = "https://sandbox-api.tilled.com/v1";
const PRODUCTION_BASE_URL: &str = "https://api.tilled.com/v1";

pub struct TilledClient {
    base_url: String,
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

/// Error body shape returned by the PSP
#[derive(Debug, Deserialize)]
struct TilledError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TilledCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TilledPaymentMethod {
    id: String,
    #[serde(rename = "type")]
    method_type: String,
    card: Option<TilledCard>,
    ach_debit: Option<TilledBankAccount>,
    eft_debit: Option<TilledBankAccount>,
}

#[derive(Debug, Deserialize)]
struct TilledCard {
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<i32>,
    exp_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TilledBankAccount {
    bank_name: Option<String>,
    last2: Option<String>,
    last4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TilledSubscription {
    id: String,
    status: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TilledPaymentIntent {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct TilledRefund {
    id: String,
    status: String,
}

impl TilledClient {
    pub fn new(config: &PspConfig) -> Self {
        let base_url = if config.sandbox {
            SANDBOX_BASE_URL.to_string()
        } else {
            PRODUCTION_BASE_URL.to_string()
        };

        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .expect("reqwest client"),
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(config: &PspConfig, base_url: String) -> Self {
        let mut client = Self::new(config);
        client.base_url = base_url;
        client
    }

    /// Acquire a concurrency permit without waiting.
    fn permit(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        self.permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::Backpressure)
    }

    async fn send(
        &self,
        app: &AppConfig,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = builder
            .header("Authorization", format!("Bearer {}", app.psp_secret_key))
            .header("tilled-account", &app.psp_account_id)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::payment_processor("timeout", "payment processor request timed out")
                } else {
                    Error::payment_processor("network_error", e.to_string())
                }
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: TilledError = serde_json::from_str(&body).unwrap_or(TilledError {
            code: None,
            message: None,
        });

        Err(Error::PaymentProcessor {
            code: parsed.code.unwrap_or_else(|| format!("http_{}", status.as_u16())),
            message: parsed
                .message
                .unwrap_or_else(|| "payment processor request failed".to_string()),
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| Error::payment_processor("decode_error", e.to_string()))
    }
}

#[async_trait]
impl PspClient for TilledClient {
    async fn create_customer(
        &self,
        app: &AppConfig,
        email: &str,
        name: &str,
    ) -> Result<PspCustomer> {
        let _permit = self.permit()?;
        let response = self
            .send(
                app,
                self.client
                    .post(format!("{}/customers", self.base_url))
                    .json(&serde_json::json!({ "email": email, "full_name": name })),
            )
            .await?;

        let customer: TilledCustomer = Self::decode(response).await?;
        Ok(PspCustomer { id: customer.id })
    }

    async fn update_customer(
        &self,
        app: &AppConfig,
        psp_customer_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<()> {
        let _permit = self.permit()?;
        let mut body = serde_json::Map::new();
        if let Some(email) = email {
            body.insert("email".to_string(), serde_json::json!(email));
        }
        if let Some(name) = name {
            body.insert("full_name".to_string(), serde_json::json!(name));
        }

        self.send(
            app,
            self.client
                .patch(format!("{}/customers/{}", self.base_url, psp_customer_id))
                .json(&body),
        )
        .await?;

        Ok(())
    }

    async fn attach_payment_method(
        &self,
        app: &AppConfig,
        psp_customer_id: &str,
        payment_method_token: &str,
    ) -> Result<()> {
        let _permit = self.permit()?;
        self.send(
            app,
            self.client
                .put(format!(
                    "{}/payment-methods/{}/attach",
                    self.base_url, payment_method_token
                ))
                .json(&serde_json::json!({ "customer_id": psp_customer_id })),
        )
        .await?;

        Ok(())
    }

    async fn get_payment_method(
        &self,
        app: &AppConfig,
        payment_method_token: &str,
    ) -> Result<PspPaymentMethod> {
        let _permit = self.permit()?;
        let response = self
            .send(
                app,
                self.client.get(format!(
                    "{}/payment-methods/{}",
                    self.base_url, payment_method_token
                )),
            )
            .await?;

        let method: TilledPaymentMethod = Self::decode(response).await?;

        let method_type = match method.method_type.as_str() {
            "ach_debit" => crate::models::PaymentMethodType::AchDebit,
            "eft_debit" => crate::models::PaymentMethodType::EftDebit,
            _ => crate::models::PaymentMethodType::Card,
        };

        let bank = method.ach_debit.or(method.eft_debit);
        Ok(PspPaymentMethod {
            id: method.id,
            method_type,
            brand: method.card.as_ref().and_then(|c| c.brand.clone()),
            last4: method.card.as_ref().and_then(|c| c.last4.clone()),
            exp_month: method.card.as_ref().and_then(|c| c.exp_month),
            exp_year: method.card.as_ref().and_then(|c| c.exp_year),
            bank_name: bank.as_ref().and_then(|b| b.bank_name.clone()),
            bank_last4: bank
                .as_ref()
                .and_then(|b| b.last4.clone().or(b.last2.clone())),
        })
    }

    async fn detach_payment_method(
        &self,
        app: &AppConfig,
        payment_method_token: &str,
    ) -> Result<()> {
        let _permit = self.permit()?;
        self.send(
            app,
            self.client.put(format!(
                "{}/payment-methods/{}/detach",
                self.base_url, payment_method_token
            )),
        )
        .await?;

        Ok(())
    }

    async fn create_subscription(
        &self,
        app: &AppConfig,
        params: &PspSubscriptionParams,
    ) -> Result<PspSubscription> {
        let _permit = self.permit()?;
        let mut body = serde_json::json!({
            "customer_id": params.customer_id,
            "payment_method_id": params.payment_method_token,
            "price": params.price_cents,
            "currency": "usd",
            "interval_unit": params.interval_unit,
            "interval_count": params.interval_count,
            "metadata": { "plan_id": params.plan_id },
        });
        if let Some(anchor) = params.billing_cycle_anchor {
            body["billing_cycle_anchor"] = serde_json::json!(anchor.to_rfc3339());
        }

        let response = self
            .send(
                app,
                self.client
                    .post(format!("{}/subscriptions", self.base_url))
                    .json(&body),
            )
            .await?;

        let subscription: TilledSubscription = Self::decode(response).await?;
        Ok(PspSubscription {
            id: subscription.id,
            status: subscription.status,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
        })
    }

    async fn set_cancel_at_period_end(
        &self,
        app: &AppConfig,
        psp_subscription_id: &str,
    ) -> Result<()> {
        let _permit = self.permit()?;
        self.send(
            app,
            self.client
                .patch(format!(
                    "{}/subscriptions/{}",
                    self.base_url, psp_subscription_id
                ))
                .json(&serde_json::json!({ "cancel_at_period_end": true })),
        )
        .await?;

        Ok(())
    }

    async fn cancel_subscription(
        &self,
        app: &AppConfig,
        psp_subscription_id: &str,
    ) -> Result<()> {
        let _permit = self.permit()?;
        self.send(
            app,
            self.client.post(format!(
                "{}/subscriptions/{}/cancel",
                self.base_url, psp_subscription_id
            )),
        )
        .await?;

        Ok(())
    }

    async fn create_charge(
        &self,
        app: &AppConfig,
        psp_customer_id: &str,
        payment_method_token: &str,
        amount_cents: i64,
        currency: &str,
        reference_id: &str,
    ) -> Result<PspCharge> {
        let _permit = self.permit()?;
        let response = self
            .send(
                app,
                self.client
                    .post(format!("{}/payment-intents", self.base_url))
                    .json(&serde_json::json!({
                        "customer_id": psp_customer_id,
                        "payment_method_id": payment_method_token,
                        "amount": amount_cents,
                        "currency": currency,
                        "confirm": true,
                        "metadata": { "reference_id": reference_id },
                    })),
            )
            .await?;

        let intent: TilledPaymentIntent = Self::decode(response).await?;
        Ok(PspCharge {
            id: intent.id,
            status: intent.status,
        })
    }

    async fn create_refund(
        &self,
        app: &AppConfig,
        psp_charge_id: &str,
        amount_cents: i64,
        reason: Option<&str>,
    ) -> Result<PspRefund> {
        let _permit = self.permit()?;
        let mut body = serde_json::json!({
            "payment_intent_id": psp_charge_id,
            "amount": amount_cents,
        });
        if let Some(reason) = reason {
            body["reason"] = serde_json::json!(reason);
        }

        let response = self
            .send(
                app,
                self.client
                    .post(format!("{}/refunds", self.base_url))
                    .json(&body),
            )
            .await?;

        let refund: TilledRefund = Self::decode(response).await?;
        Ok(PspRefund {
            id: refund.id,
            status: refund.status,
        })
    }
}
