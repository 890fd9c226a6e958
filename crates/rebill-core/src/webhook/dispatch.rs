//! Webhook event dispatch
//!
//! Maps PSP event types onto local state. Handlers are idempotent
//! upserts keyed by PSP id: a known entity is updated in place, an
//! unknown one is created only when the payload carries enough linking
//! identifiers; otherwise the event is logged and dropped without
//! touching domain tables.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{ChargeStatus, RefundStatus, SubscriptionStatus, UpdateCustomerRequest};
use crate::repository::dispute_repository::DisputeUpsert;
use crate::repository::subscription_repository::SubscriptionSync;
use crate::repository::{
    ChargeRepository, CustomerRepository, DisputeRepository, PaymentMethodRepository,
    RefundRepository, SubscriptionRepository,
};
use crate::Result;

use super::EventDispatcher;

#[derive(Clone)]
pub struct Dispatcher {
    customers: Arc<dyn CustomerRepository>,
    payment_methods: Arc<dyn PaymentMethodRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    charges: Arc<dyn ChargeRepository>,
    refunds: Arc<dyn RefundRepository>,
    disputes: Arc<dyn DisputeRepository>,
}

impl Dispatcher {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        payment_methods: Arc<dyn PaymentMethodRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        charges: Arc<dyn ChargeRepository>,
        refunds: Arc<dyn RefundRepository>,
        disputes: Arc<dyn DisputeRepository>,
    ) -> Self {
        Self {
            customers,
            payment_methods,
            subscriptions,
            charges,
            refunds,
            disputes,
        }
    }
}

#[async_trait]
impl EventDispatcher for Dispatcher {
    async fn dispatch(
        &self,
        app_id: &str,
        event_type: &str,
        object: &serde_json::Value,
    ) -> Result<()> {
        match event_type.split('.').next().unwrap_or("") {
            "subscription" => self.handle_subscription(app_id, object).await,
            "charge" | "payment_intent" => self.handle_charge(app_id, event_type, object).await,
            "refund" => self.handle_refund(app_id, object).await,
            "dispute" => self.handle_dispute(app_id, object).await,
            "payment_method" => self.handle_payment_method(app_id, event_type, object).await,
            "customer" => self.handle_customer(app_id, object).await,
            _ => {
                debug!(app_id, event_type, "ignoring unhandled webhook event type");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    status: Option<String>,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: Option<bool>,
    canceled_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    id: String,
    status: Option<String>,
    failure_code: Option<String>,
    failure_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundObject {
    id: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisputeObject {
    id: String,
    charge_id: Option<String>,
    payment_intent_id: Option<String>,
    status: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    reason: Option<String>,
    evidence_due_by: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CustomerObject {
    id: String,
    email: Option<String>,
    #[serde(alias = "full_name")]
    name: Option<String>,
}

fn map_subscription_status(status: &str) -> Option<SubscriptionStatus> {
    match status {
        "incomplete" => Some(SubscriptionStatus::Incomplete),
        "incomplete_expired" => Some(SubscriptionStatus::IncompleteExpired),
        "trialing" => Some(SubscriptionStatus::Trialing),
        "active" => Some(SubscriptionStatus::Active),
        "past_due" => Some(SubscriptionStatus::PastDue),
        "canceled" | "cancelled" => Some(SubscriptionStatus::Canceled),
        "unpaid" => Some(SubscriptionStatus::Unpaid),
        "paused" => Some(SubscriptionStatus::Paused),
        _ => None,
    }
}

impl Dispatcher {
    async fn handle_subscription(&self, app_id: &str, object: &serde_json::Value) -> Result<()> {
        let sub: SubscriptionObject = serde_json::from_value(object.clone())?;

        let sync = SubscriptionSync {
            status: sub.status.as_deref().and_then(map_subscription_status),
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            canceled_at: sub.canceled_at,
            ended_at: sub.ended_at,
        };

        match self
            .subscriptions
            .sync_by_psp_id(app_id, &sub.id, &sync)
            .await?
        {
            Some(_) => Ok(()),
            None => {
                // No local subscription and not enough to create one from
                // a bare lifecycle event; a creation flow always writes
                // the local row first.
                warn!(
                    app_id,
                    psp_subscription_id = %sub.id,
                    "subscription webhook for unknown subscription, skipping"
                );
                Ok(())
            }
        }
    }

    async fn handle_charge(
        &self,
        app_id: &str,
        event_type: &str,
        object: &serde_json::Value,
    ) -> Result<()> {
        let charge: ChargeObject = serde_json::from_value(object.clone())?;

        let status = if event_type.ends_with(".failed") {
            ChargeStatus::Failed
        } else {
            match charge.status.as_deref() {
                Some("failed") | Some("canceled") => ChargeStatus::Failed,
                Some("pending") | Some("processing") => ChargeStatus::Pending,
                _ => ChargeStatus::Succeeded,
            }
        };

        let updated = self
            .charges
            .sync_status_by_psp_id(
                app_id,
                &charge.id,
                status,
                charge.failure_code.as_deref(),
                charge.failure_message.as_deref(),
            )
            .await?;

        if updated.is_none() {
            warn!(app_id, psp_charge_id = %charge.id, "charge webhook for unknown charge, skipping");
        }
        Ok(())
    }

    async fn handle_refund(&self, app_id: &str, object: &serde_json::Value) -> Result<()> {
        let refund: RefundObject = serde_json::from_value(object.clone())?;

        let status = match refund.status.as_deref() {
            Some("failed") | Some("canceled") => RefundStatus::Failed,
            Some("pending") | Some("processing") => RefundStatus::Pending,
            _ => RefundStatus::Succeeded,
        };

        let updated = self
            .refunds
            .sync_status_by_psp_id(app_id, &refund.id, status)
            .await?;

        if updated.is_none() {
            warn!(app_id, psp_refund_id = %refund.id, "refund webhook for unknown refund, skipping");
        }
        Ok(())
    }

    async fn handle_dispute(&self, app_id: &str, object: &serde_json::Value) -> Result<()> {
        let dispute: DisputeObject = serde_json::from_value(object.clone())?;

        let psp_charge_id = dispute
            .charge_id
            .clone()
            .or_else(|| dispute.payment_intent_id.clone());
        let Some(psp_charge_id) = psp_charge_id else {
            warn!(app_id, psp_dispute_id = %dispute.id, "dispute webhook without a charge link, skipping");
            return Ok(());
        };

        let Some(charge) = self.charges.find_by_psp_id(app_id, &psp_charge_id).await? else {
            warn!(
                app_id,
                psp_dispute_id = %dispute.id,
                psp_charge_id = %psp_charge_id,
                "dispute webhook for unknown charge, skipping"
            );
            return Ok(());
        };

        self.disputes
            .upsert_by_psp_id(
                app_id,
                &DisputeUpsert {
                    customer_id: charge.customer_id,
                    charge_id: charge.id,
                    psp_dispute_id: dispute.id,
                    status: dispute.status.unwrap_or_else(|| "open".to_string()),
                    amount_cents: dispute.amount.unwrap_or(charge.amount_cents),
                    currency: dispute.currency.unwrap_or_else(|| charge.currency.clone()),
                    reason: dispute.reason,
                    evidence_due_by: dispute.evidence_due_by,
                },
            )
            .await?;

        Ok(())
    }

    async fn handle_payment_method(
        &self,
        app_id: &str,
        event_type: &str,
        object: &serde_json::Value,
    ) -> Result<()> {
        let method: PaymentMethodObject = serde_json::from_value(object.clone())?;

        if event_type.ends_with(".detached") {
            match self.payment_methods.soft_delete(app_id, &method.id).await {
                Ok(deleted) => {
                    if deleted.is_default {
                        self.customers
                            .clear_default_payment_method(app_id, deleted.customer_id)
                            .await?;
                    }
                }
                Err(e) if matches!(e, crate::Error::NotFound(_)) => {
                    debug!(app_id, psp_payment_method_id = %method.id, "detach for unknown method");
                }
                Err(e) => return Err(e),
            }
        }
        // Attach events are driven by the add-payment-method flow, which
        // writes the local row itself.
        Ok(())
    }

    async fn handle_customer(&self, app_id: &str, object: &serde_json::Value) -> Result<()> {
        let customer: CustomerObject = serde_json::from_value(object.clone())?;

        let Some(local) = self.customers.find_by_psp_id(app_id, &customer.id).await? else {
            warn!(app_id, psp_customer_id = %customer.id, "customer webhook for unknown customer, skipping");
            return Ok(());
        };

        if customer.email.is_some() || customer.name.is_some() {
            self.customers
                .update(
                    app_id,
                    local.id,
                    &UpdateCustomerRequest {
                        email: customer.email,
                        name: customer.name,
                        metadata: None,
                    },
                )
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntervalUnit, PaymentMethodType};
    use crate::repository::subscription_repository::NewSubscription;
    use crate::services::test_support::*;
    use chrono::Utc;

    struct Fixture {
        dispatcher: Dispatcher,
        customers: Arc<MemCustomerRepository>,
        subscriptions: Arc<MemSubscriptionRepository>,
        charges: Arc<MemChargeRepository>,
        disputes: Arc<MemDisputeRepository>,
    }

    fn fixture() -> Fixture {
        let customers = MemCustomerRepository::new();
        let payment_methods = MemPaymentMethodRepository::new(customers.clone());
        let subscriptions = MemSubscriptionRepository::new();
        let charges = MemChargeRepository::new();
        let refunds = MemRefundRepository::new();
        let disputes = MemDisputeRepository::new();
        Fixture {
            dispatcher: Dispatcher::new(
                customers.clone(),
                payment_methods,
                subscriptions.clone(),
                charges.clone(),
                refunds,
                disputes.clone(),
            ),
            customers,
            subscriptions,
            charges,
            disputes,
        }
    }

    #[tokio::test]
    async fn test_subscription_updated_syncs_status() {
        let f = fixture();
        let customer = f.customers.seed("acme", "C1").await;
        let now = Utc::now();
        f.subscriptions
            .create(
                "acme",
                &NewSubscription {
                    customer_id: customer.id,
                    psp_subscription_id: Some("sub_1".to_string()),
                    plan_id: "pro".to_string(),
                    plan_name: "Pro".to_string(),
                    price_cents: 9900,
                    status: SubscriptionStatus::Active,
                    interval_unit: IntervalUnit::Month,
                    interval_count: 1,
                    billing_cycle_anchor: None,
                    current_period_start: now,
                    current_period_end: now + chrono::Duration::days(30),
                    payment_method_token: "pm_default".to_string(),
                    payment_method_type: PaymentMethodType::Card,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        f.dispatcher
            .dispatch(
                "acme",
                "subscription.updated",
                &serde_json::json!({ "id": "sub_1", "status": "past_due" }),
            )
            .await
            .unwrap();

        let rows = f.subscriptions.rows.lock().await;
        assert_eq!(rows[0].status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn test_subscription_event_for_unknown_subscription_is_skipped() {
        let f = fixture();
        f.dispatcher
            .dispatch(
                "acme",
                "subscription.updated",
                &serde_json::json!({ "id": "sub_ghost", "status": "canceled" }),
            )
            .await
            .unwrap();
        assert!(f.subscriptions.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_charge_failed_records_failure() {
        let f = fixture();
        let customer = f.customers.seed("acme", "C1").await;
        let charge = f.charges.seed_succeeded("acme", customer.id, 3500).await;
        let psp_id = charge.psp_charge_id.clone().unwrap();

        f.dispatcher
            .dispatch(
                "acme",
                "charge.failed",
                &serde_json::json!({
                    "id": psp_id,
                    "status": "failed",
                    "failure_code": "card_declined",
                    "failure_message": "declined"
                }),
            )
            .await
            .unwrap();

        let rows = f.charges.rows.lock().await;
        assert_eq!(rows[0].status, ChargeStatus::Failed);
        assert_eq!(rows[0].failure_code.as_deref(), Some("card_declined"));
    }

    #[tokio::test]
    async fn test_dispute_created_links_to_charge() {
        let f = fixture();
        let customer = f.customers.seed("acme", "C1").await;
        let charge = f.charges.seed_succeeded("acme", customer.id, 3500).await;
        let psp_charge_id = charge.psp_charge_id.clone().unwrap();

        let object = serde_json::json!({
            "id": "dp_1",
            "charge_id": psp_charge_id,
            "status": "needs_response",
            "amount": 3500,
            "currency": "usd"
        });

        f.dispatcher
            .dispatch("acme", "dispute.created", &object)
            .await
            .unwrap();
        // Redelivery updates in place instead of duplicating.
        f.dispatcher
            .dispatch("acme", "dispute.created", &object)
            .await
            .unwrap();

        let rows = f.disputes.rows.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].charge_id, charge.id);
        assert_eq!(rows[0].customer_id, customer.id);
    }

    #[tokio::test]
    async fn test_dispute_without_charge_link_is_skipped() {
        let f = fixture();
        f.dispatcher
            .dispatch(
                "acme",
                "dispute.created",
                &serde_json::json!({ "id": "dp_1", "status": "open" }),
            )
            .await
            .unwrap();
        assert!(f.disputes.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_customer_updated_syncs_email() {
        let f = fixture();
        let customer = f.customers.seed("acme", "C1").await;
        let psp_id = customer.psp_customer_id.clone().unwrap();

        f.dispatcher
            .dispatch(
                "acme",
                "customer.updated",
                &serde_json::json!({ "id": psp_id, "email": "new@example.com" }),
            )
            .await
            .unwrap();

        let rows = f.customers.rows.lock().await;
        assert_eq!(rows[0].email, "new@example.com");
    }

    #[tokio::test]
    async fn test_unhandled_event_type_is_ignored() {
        let f = fixture();
        f.dispatcher
            .dispatch("acme", "account.updated", &serde_json::json!({ "id": "acct_1" }))
            .await
            .unwrap();
    }
}
