//! Subscription Service
//!
//! Creation is fail-fast: no local row persists for a subscription the
//! PSP rejected. Cancellation is two-mode (now vs at period end). The
//! billing-cycle change is create-new + cancel-old because the PSP does
//! not permit interval mutation; both PSP calls must succeed before the
//! single local transaction swaps the rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{
    CancelSubscriptionRequest, ChangeCycleRequest, CreateSubscriptionRequest, Customer,
    IntervalUnit, PaymentMethodType, Subscription, SubscriptionStatus, UpdateSubscriptionRequest,
};
use crate::psp::{PspClient, PspSubscriptionParams};
use crate::repository::subscription_repository::NewSubscription;
use crate::repository::{CustomerRepository, SubscriptionRepository};
use crate::{Error, Result};

/// Fields a subscription update may carry; anything else is rejected by
/// name.
const UPDATE_WHITELIST: &[&str] = &["plan_id", "plan_name", "price_cents", "metadata"];

const CHANGE_CYCLE_WHITELIST: &[&str] = &[
    // app_id is tenant addressing, not a mutation field
    "app_id",
    "customer_id",
    "from_subscription_id",
    "new_plan_id",
    "new_plan_name",
    "price_cents",
    "interval_unit",
    "interval_count",
    "payment_method_token",
    "metadata",
];

/// Reject any body field outside the whitelist, naming the offenders.
pub fn reject_unsupported_fields(body: &serde_json::Value, allowed: &[&str]) -> Result<()> {
    let Some(object) = body.as_object() else {
        return Ok(());
    };

    let unsupported: Vec<&str> = object
        .keys()
        .map(|k| k.as_str())
        .filter(|k| !allowed.contains(k))
        .collect();

    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "unsupported field(s): {}",
            unsupported.join(", ")
        )))
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    customers: Arc<dyn CustomerRepository>,
    psp: Arc<dyn PspClient>,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        customers: Arc<dyn CustomerRepository>,
        psp: Arc<dyn PspClient>,
    ) -> Self {
        Self {
            subscriptions,
            customers,
            psp,
        }
    }

    pub async fn create(
        &self,
        app: &AppConfig,
        request: &CreateSubscriptionRequest,
    ) -> Result<Subscription> {
        if request.price_cents <= 0 {
            return Err(Error::validation("price_cents must be a positive integer"));
        }

        let customer = self
            .customers
            .find_by_id(&app.app_id, request.customer_id)
            .await?
            .ok_or_else(|| Error::not_found("Customer not found"))?;

        let (token, method_type) = self.resolve_payment_method(
            &customer,
            request.payment_method_token.as_deref(),
        )?;

        let psp_customer_id = customer
            .psp_customer_id
            .as_deref()
            .ok_or_else(|| Error::conflict("customer has no payment profile at the processor"))?;

        let interval_count = request.interval_count.unwrap_or(1);

        // Fail fast: nothing is persisted for a subscription the PSP
        // rejected.
        let psp_subscription = self
            .psp
            .create_subscription(
                app,
                &PspSubscriptionParams {
                    customer_id: psp_customer_id.to_string(),
                    payment_method_token: token.clone(),
                    plan_id: request.plan_id.clone(),
                    price_cents: request.price_cents,
                    interval_unit: interval_unit_str(request.interval_unit).to_string(),
                    interval_count,
                    billing_cycle_anchor: request.billing_cycle_anchor,
                },
            )
            .await?;

        let now = Utc::now();
        let period_start = psp_subscription.current_period_start.unwrap_or(now);
        let period_end = psp_subscription
            .current_period_end
            .unwrap_or_else(|| add_interval(period_start, request.interval_unit, interval_count));

        self.subscriptions
            .create(
                &app.app_id,
                &NewSubscription {
                    customer_id: customer.id,
                    psp_subscription_id: Some(psp_subscription.id),
                    plan_id: request.plan_id.clone(),
                    plan_name: request.plan_name.clone(),
                    price_cents: request.price_cents,
                    status: map_psp_status(&psp_subscription.status),
                    interval_unit: request.interval_unit,
                    interval_count,
                    billing_cycle_anchor: request.billing_cycle_anchor,
                    current_period_start: period_start,
                    current_period_end: period_end,
                    payment_method_token: token,
                    payment_method_type: method_type,
                    metadata: request.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
                },
            )
            .await
    }

    pub async fn get(&self, app_id: &str, id: Uuid) -> Result<Subscription> {
        self.subscriptions
            .find_by_id(app_id, id)
            .await?
            .ok_or_else(|| Error::not_found("Subscription not found"))
    }

    pub async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Subscription>> {
        self.subscriptions.list(app_id, customer_id).await
    }

    /// Whitelist update. Price changes affect future billing only; the
    /// PSP's own proration settings govern immediate adjustments.
    pub async fn update(
        &self,
        app: &AppConfig,
        id: Uuid,
        raw_body: &serde_json::Value,
    ) -> Result<Subscription> {
        reject_unsupported_fields(raw_body, UPDATE_WHITELIST)?;
        let request: UpdateSubscriptionRequest = serde_json::from_value(raw_body.clone())?;

        let subscription = self.get(&app.app_id, id).await?;
        if subscription.status == SubscriptionStatus::Canceled {
            return Err(Error::validation("cannot update a canceled subscription"));
        }
        if let Some(price) = request.price_cents {
            if price <= 0 {
                return Err(Error::validation("price_cents must be a positive integer"));
            }
        }

        self.subscriptions.update(&app.app_id, id, &request).await
    }

    pub async fn cancel(
        &self,
        app: &AppConfig,
        id: Uuid,
        request: &CancelSubscriptionRequest,
    ) -> Result<Subscription> {
        let subscription = self.get(&app.app_id, id).await?;
        if subscription.status == SubscriptionStatus::Canceled {
            return Err(Error::validation("subscription is already canceled"));
        }

        if request.at_period_end {
            // Local flag first; the PSP update is best-effort and the
            // definitive cancellation arrives via webhook at period end.
            let updated = self
                .subscriptions
                .set_cancel_at_period_end(&app.app_id, id)
                .await?;

            if let Some(psp_id) = subscription.psp_subscription_id.as_deref() {
                if let Err(e) = self.psp.set_cancel_at_period_end(app, psp_id).await {
                    warn!(
                        app_id = %app.app_id,
                        subscription_id = %id,
                        psp_subscription_id = %psp_id,
                        error = %e,
                        divergence_risk = "low",
                        "PSP cancel-at-period-end update failed"
                    );
                }
            }
            return Ok(updated);
        }

        // Immediate cancel is fail-fast at the PSP.
        if let Some(psp_id) = subscription.psp_subscription_id.as_deref() {
            self.psp.cancel_subscription(app, psp_id).await?;
        }
        self.subscriptions
            .cancel_now(&app.app_id, id, Utc::now())
            .await
    }

    /// Billing-cycle swap (monthly <-> annual).
    ///
    /// Order matters: create the replacement at the PSP, cancel the old
    /// one at the PSP, and only with both confirmed run the single local
    /// transaction. A failed cancel aborts before any local write.
    pub async fn change_cycle(
        &self,
        app: &AppConfig,
        raw_body: &serde_json::Value,
    ) -> Result<Subscription> {
        reject_unsupported_fields(raw_body, CHANGE_CYCLE_WHITELIST)?;
        let request: ChangeCycleRequest = serde_json::from_value(raw_body.clone())?;

        if request.price_cents <= 0 {
            return Err(Error::validation("price_cents must be a positive integer"));
        }

        let customer = self
            .customers
            .find_by_id(&app.app_id, request.customer_id)
            .await?
            .ok_or_else(|| Error::not_found("Customer not found"))?;

        let old = self.get(&app.app_id, request.from_subscription_id).await?;
        if old.customer_id != customer.id {
            return Err(Error::not_found("Subscription not found"));
        }
        let old_psp_id = old
            .psp_subscription_id
            .clone()
            .ok_or_else(|| Error::conflict("subscription has no processor handle"))?;

        let token = request
            .payment_method_token
            .clone()
            .unwrap_or_else(|| old.payment_method_token.clone());
        let psp_customer_id = customer
            .psp_customer_id
            .as_deref()
            .ok_or_else(|| Error::conflict("customer has no payment profile at the processor"))?;

        let interval_count = request.interval_count.unwrap_or(1);

        let psp_new = self
            .psp
            .create_subscription(
                app,
                &PspSubscriptionParams {
                    customer_id: psp_customer_id.to_string(),
                    payment_method_token: token.clone(),
                    plan_id: request.new_plan_id.clone(),
                    price_cents: request.price_cents,
                    interval_unit: interval_unit_str(request.interval_unit).to_string(),
                    interval_count,
                    billing_cycle_anchor: None,
                },
            )
            .await?;

        if let Err(e) = self.psp.cancel_subscription(app, &old_psp_id).await {
            // Abort before any local write. Best-effort rollback of the
            // replacement; if this also fails both subscriptions survive
            // at the PSP and reconciliation picks them up.
            if let Err(rollback) = self.psp.cancel_subscription(app, &psp_new.id).await {
                warn!(
                    app_id = %app.app_id,
                    old_psp_subscription_id = %old_psp_id,
                    new_psp_subscription_id = %psp_new.id,
                    error = %rollback,
                    divergence_risk = "high",
                    "cycle-swap rollback cancel failed"
                );
            }
            return Err(e);
        }

        let now = Utc::now();
        let period_start = psp_new.current_period_start.unwrap_or(now);
        let period_end = psp_new
            .current_period_end
            .unwrap_or_else(|| add_interval(period_start, request.interval_unit, interval_count));

        self.subscriptions
            .swap_cycle(
                &app.app_id,
                old.id,
                &NewSubscription {
                    customer_id: customer.id,
                    psp_subscription_id: Some(psp_new.id),
                    plan_id: request.new_plan_id.clone(),
                    plan_name: request
                        .new_plan_name
                        .clone()
                        .unwrap_or_else(|| request.new_plan_id.clone()),
                    price_cents: request.price_cents,
                    status: map_psp_status(&psp_new.status),
                    interval_unit: request.interval_unit,
                    interval_count,
                    billing_cycle_anchor: None,
                    current_period_start: period_start,
                    current_period_end: period_end,
                    payment_method_token: token,
                    payment_method_type: old.payment_method_type,
                    metadata: request.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
                },
                now,
            )
            .await
    }

    fn resolve_payment_method(
        &self,
        customer: &Customer,
        supplied: Option<&str>,
    ) -> Result<(String, PaymentMethodType)> {
        if let Some(token) = supplied {
            return Ok((
                token.to_string(),
                customer
                    .default_payment_method_type
                    .unwrap_or(PaymentMethodType::Card),
            ));
        }
        match (
            customer.default_payment_method_token.as_deref(),
            customer.default_payment_method_type,
        ) {
            (Some(token), Some(method_type)) => Ok((token.to_string(), method_type)),
            _ => Err(Error::conflict("customer has no default payment method")),
        }
    }
}

fn interval_unit_str(unit: IntervalUnit) -> &'static str {
    match unit {
        IntervalUnit::Day => "day",
        IntervalUnit::Week => "week",
        IntervalUnit::Month => "month",
        IntervalUnit::Year => "year",
    }
}

fn map_psp_status(status: &str) -> SubscriptionStatus {
    match status {
        "trialing" => SubscriptionStatus::Trialing,
        "active" => SubscriptionStatus::Active,
        "past_due" => SubscriptionStatus::PastDue,
        "canceled" | "cancelled" => SubscriptionStatus::Canceled,
        "unpaid" => SubscriptionStatus::Unpaid,
        "paused" => SubscriptionStatus::Paused,
        "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
        _ => SubscriptionStatus::Incomplete,
    }
}

fn add_interval(start: DateTime<Utc>, unit: IntervalUnit, count: i32) -> DateTime<Utc> {
    let count = count.max(1);
    match unit {
        IntervalUnit::Day => start + Duration::days(count as i64),
        IntervalUnit::Week => start + Duration::weeks(count as i64),
        IntervalUnit::Month => start
            .checked_add_months(chrono::Months::new(count as u32))
            .unwrap_or(start + Duration::days(30 * count as i64)),
        IntervalUnit::Year => start
            .checked_add_months(chrono::Months::new(count as u32 * 12))
            .unwrap_or(start + Duration::days(365 * count as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    async fn service() -> (
        SubscriptionService,
        Arc<MemSubscriptionRepository>,
        Arc<MemCustomerRepository>,
        Arc<MockPsp>,
    ) {
        let customers = MemCustomerRepository::new();
        let subscriptions = MemSubscriptionRepository::new();
        let psp = MockPsp::new();
        (
            SubscriptionService::new(subscriptions.clone(), customers.clone(), psp.clone()),
            subscriptions,
            customers,
            psp,
        )
    }

    fn create_request(customer_id: Uuid) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            customer_id,
            plan_id: "pro-monthly".to_string(),
            plan_name: "Pro Monthly".to_string(),
            price_cents: 9900,
            interval_unit: IntervalUnit::Month,
            interval_count: None,
            payment_method_token: None,
            billing_cycle_anchor: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_create_uses_default_payment_method() {
        let (service, repo, customers, _) = service().await;
        let customer = customers.seed("acme", "C1").await;

        let subscription = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap();

        assert_eq!(subscription.payment_method_token, "pm_default");
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(repo.rows.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_without_default_method_conflicts() {
        let (service, repo, customers, psp) = service().await;
        let customer = customers.seed("acme", "C1").await;
        {
            let mut rows = customers.rows.lock().await;
            rows[0].default_payment_method_token = None;
            rows[0].default_payment_method_type = None;
        }

        let err = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(repo.rows.lock().await.is_empty());
        assert_eq!(psp.call_count("create_subscription").await, 0);
    }

    #[tokio::test]
    async fn test_create_fails_fast_without_local_row() {
        let (service, repo, customers, psp) = service().await;
        let customer = customers.seed("acme", "C1").await;
        psp.fail_on("create_subscription").await;

        let err = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PaymentProcessor { .. }));
        assert!(repo.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_at_period_end_keeps_status_active() {
        let (service, _, customers, psp) = service().await;
        let customer = customers.seed("acme", "C1").await;
        let subscription = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap();

        let canceled = service
            .cancel(
                &app_config(),
                subscription.id,
                &CancelSubscriptionRequest { at_period_end: true },
            )
            .await
            .unwrap();

        assert!(canceled.cancel_at_period_end);
        assert_eq!(canceled.status, SubscriptionStatus::Active);
        assert_eq!(psp.call_count("set_cancel_at_period_end").await, 1);
    }

    #[tokio::test]
    async fn test_cancel_at_period_end_survives_psp_failure() {
        let (service, _, customers, psp) = service().await;
        let customer = customers.seed("acme", "C1").await;
        let subscription = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap();
        psp.fail_on("set_cancel_at_period_end").await;

        let canceled = service
            .cancel(
                &app_config(),
                subscription.id,
                &CancelSubscriptionRequest { at_period_end: true },
            )
            .await
            .unwrap();
        assert!(canceled.cancel_at_period_end);
    }

    #[tokio::test]
    async fn test_immediate_cancel_is_fail_fast() {
        let (service, repo, customers, psp) = service().await;
        let customer = customers.seed("acme", "C1").await;
        let subscription = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap();
        psp.fail_on("cancel_subscription").await;

        let err = service
            .cancel(
                &app_config(),
                subscription.id,
                &CancelSubscriptionRequest { at_period_end: false },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PaymentProcessor { .. }));

        let rows = repo.rows.lock().await;
        assert_eq!(rows[0].status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_update_rejects_unsupported_fields_by_name() {
        let (service, _, customers, _) = service().await;
        let customer = customers.seed("acme", "C1").await;
        let subscription = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap();

        let err = service
            .update(
                &app_config(),
                subscription.id,
                &serde_json::json!({
                    "price_cents": 12900,
                    "interval_unit": "year",
                    "app_id": "evil"
                }),
            )
            .await
            .unwrap_err();

        match err {
            Error::Validation(msg) => {
                assert!(msg.contains("unsupported field(s)"));
                assert!(msg.contains("interval_unit"));
                assert!(msg.contains("app_id"));
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_whitelisted_fields() {
        let (service, _, customers, _) = service().await;
        let customer = customers.seed("acme", "C1").await;
        let subscription = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap();

        let updated = service
            .update(
                &app_config(),
                subscription.id,
                &serde_json::json!({ "price_cents": 12900, "plan_name": "Pro+" }),
            )
            .await
            .unwrap();
        assert_eq!(updated.price_cents, 12900);
        assert_eq!(updated.plan_name, "Pro+");
    }

    fn change_cycle_body(customer_id: Uuid, from: Uuid) -> serde_json::Value {
        serde_json::json!({
            "customer_id": customer_id,
            "from_subscription_id": from,
            "new_plan_id": "pro-annual",
            "price_cents": 99900,
            "interval_unit": "year"
        })
    }

    #[tokio::test]
    async fn test_change_cycle_swaps_rows() {
        let (service, repo, customers, psp) = service().await;
        let customer = customers.seed("acme", "C1").await;
        let old = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap();

        let new = service
            .change_cycle(&app_config(), &change_cycle_body(customer.id, old.id))
            .await
            .unwrap();

        assert_eq!(new.plan_id, "pro-annual");
        assert_eq!(new.interval_unit, IntervalUnit::Year);
        assert_eq!(psp.call_count("create_subscription").await, 2);
        assert_eq!(psp.call_count("cancel_subscription").await, 1);

        let rows = repo.rows.lock().await;
        assert_eq!(rows.len(), 2);
        let old_row = rows.iter().find(|s| s.id == old.id).unwrap();
        assert_eq!(old_row.status, SubscriptionStatus::Canceled);
        assert!(old_row.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_change_cycle_aborts_when_cancel_old_fails() {
        // Inject a PSP failure on the cancel-old step: no new row, old row
        // untouched.
        let (service, repo, customers, psp) = service().await;
        let customer = customers.seed("acme", "C1").await;
        let old = service
            .create(&app_config(), &create_request(customer.id))
            .await
            .unwrap();
        psp.fail_on("cancel_subscription").await;

        let err = service
            .change_cycle(&app_config(), &change_cycle_body(customer.id, old.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PaymentProcessor { .. }));

        let rows = repo.rows.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, SubscriptionStatus::Active);
        assert!(rows[0].ended_at.is_none());
    }

    #[tokio::test]
    async fn test_change_cycle_rejects_unsupported_fields() {
        let (service, _, customers, _) = service().await;
        let customer = customers.seed("acme", "C1").await;
        let mut body = change_cycle_body(customer.id, Uuid::new_v4());
        body["status"] = serde_json::json!("active");

        let err = service.change_cycle(&app_config(), &body).await.unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("status")));
    }

    #[tokio::test]
    async fn test_change_cycle_cross_tenant_subscription_not_found() {
        let (service, _, customers, _) = service().await;
        let acme_customer = customers.seed("acme", "C1").await;
        let other_customer = customers.seed("otherapp", "C1").await;
        let subscription = service
            .create(&app_config(), &create_request(acme_customer.id))
            .await
            .unwrap();

        let err = service
            .change_cycle(
                &other_app_config(),
                &change_cycle_body(other_customer.id, subscription.id),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
