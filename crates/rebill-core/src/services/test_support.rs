//! Shared in-memory collaborators for service tests.
//!
//! The repositories mirror the Postgres implementations' observable
//! behavior, including unique-constraint conflicts, so the recovery
//! paths in the services can be exercised without a database. The mock
//! PSP records every call and fails on demand per operation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::*;
use crate::psp::{
    PspCharge, PspClient, PspCustomer, PspPaymentMethod, PspRefund, PspSubscription,
    PspSubscriptionParams,
};
use crate::repository::charge_repository::NewCharge;
use crate::repository::dispute_repository::DisputeUpsert;
use crate::repository::payment_method_repository::MaskedDetails;
use crate::repository::refund_repository::NewRefund;
use crate::repository::subscription_repository::{NewSubscription, SubscriptionSync};
use crate::repository::*;
use crate::{Error, Result};

pub fn app_config() -> AppConfig {
    AppConfig {
        app_id: "acme".to_string(),
        psp_secret_key: "sk_test".to_string(),
        psp_account_id: "acct_test".to_string(),
        psp_webhook_secret: "whsec_test".to_string(),
        entitlements: HashMap::from([(
            "pro-monthly".to_string(),
            vec!["api".to_string(), "support".to_string()],
        )]),
    }
}

pub fn other_app_config() -> AppConfig {
    AppConfig {
        app_id: "otherapp".to_string(),
        ..app_config()
    }
}

// ---------------------------------------------------------------------------
// Mock PSP
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockPsp {
    pub calls: Mutex<Vec<String>>,
    fail_ops: Mutex<HashSet<String>>,
}

impl MockPsp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn fail_on(&self, op: &str) {
        self.fail_ops.lock().await.insert(op.to_string());
    }

    pub async fn call_count(&self, op: &str) -> usize {
        self.calls.lock().await.iter().filter(|c| *c == op).count()
    }

    async fn record(&self, op: &str) -> Result<()> {
        self.calls.lock().await.push(op.to_string());
        if self.fail_ops.lock().await.contains(op) {
            return Err(Error::payment_processor(
                "card_declined",
                format!("{} failed", op),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PspClient for MockPsp {
    async fn create_customer(
        &self,
        _app: &AppConfig,
        _email: &str,
        _name: &str,
    ) -> Result<PspCustomer> {
        self.record("create_customer").await?;
        Ok(PspCustomer {
            id: format!("cus_{}", Uuid::new_v4().simple()),
        })
    }

    async fn update_customer(
        &self,
        _app: &AppConfig,
        _psp_customer_id: &str,
        _email: Option<&str>,
        _name: Option<&str>,
    ) -> Result<()> {
        self.record("update_customer").await
    }

    async fn attach_payment_method(
        &self,
        _app: &AppConfig,
        _psp_customer_id: &str,
        _payment_method_token: &str,
    ) -> Result<()> {
        self.record("attach_payment_method").await
    }

    async fn get_payment_method(
        &self,
        _app: &AppConfig,
        payment_method_token: &str,
    ) -> Result<PspPaymentMethod> {
        self.record("get_payment_method").await?;
        Ok(PspPaymentMethod {
            id: payment_method_token.to_string(),
            method_type: PaymentMethodType::Card,
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
            exp_month: Some(12),
            exp_year: Some(2030),
            bank_name: None,
            bank_last4: None,
        })
    }

    async fn detach_payment_method(
        &self,
        _app: &AppConfig,
        _payment_method_token: &str,
    ) -> Result<()> {
        self.record("detach_payment_method").await
    }

    async fn create_subscription(
        &self,
        _app: &AppConfig,
        _params: &PspSubscriptionParams,
    ) -> Result<PspSubscription> {
        self.record("create_subscription").await?;
        let now = Utc::now();
        Ok(PspSubscription {
            id: format!("sub_{}", Uuid::new_v4().simple()),
            status: "active".to_string(),
            current_period_start: Some(now),
            current_period_end: Some(now + chrono::Duration::days(30)),
        })
    }

    async fn set_cancel_at_period_end(
        &self,
        _app: &AppConfig,
        _psp_subscription_id: &str,
    ) -> Result<()> {
        self.record("set_cancel_at_period_end").await
    }

    async fn cancel_subscription(
        &self,
        _app: &AppConfig,
        _psp_subscription_id: &str,
    ) -> Result<()> {
        self.record("cancel_subscription").await
    }

    async fn create_charge(
        &self,
        _app: &AppConfig,
        _psp_customer_id: &str,
        _payment_method_token: &str,
        _amount_cents: i64,
        _currency: &str,
        _reference_id: &str,
    ) -> Result<PspCharge> {
        self.record("create_charge").await?;
        Ok(PspCharge {
            id: format!("ch_{}", Uuid::new_v4().simple()),
            status: "succeeded".to_string(),
        })
    }

    async fn create_refund(
        &self,
        _app: &AppConfig,
        _psp_charge_id: &str,
        _amount_cents: i64,
        _reason: Option<&str>,
    ) -> Result<PspRefund> {
        self.record("create_refund").await?;
        Ok(PspRefund {
            id: format!("re_{}", Uuid::new_v4().simple()),
            status: "succeeded".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory repositories
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemCustomerRepository {
    pub rows: Mutex<Vec<Customer>>,
}

impl MemCustomerRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed(&self, app_id: &str, external_id: &str) -> Customer {
        let customer = Customer {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            external_customer_id: Some(external_id.to_string()),
            psp_customer_id: Some(format!("cus_{}", external_id)),
            email: format!("{}@example.com", external_id),
            name: external_id.to_string(),
            default_payment_method_token: Some("pm_default".to_string()),
            default_payment_method_type: Some(PaymentMethodType::Card),
            status: CustomerStatus::Active,
            delinquent_since: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.rows.lock().await.push(customer.clone());
        customer
    }
}

#[async_trait]
impl CustomerRepository for MemCustomerRepository {
    async fn create(&self, app_id: &str, request: &CreateCustomerRequest) -> Result<Customer> {
        let mut rows = self.rows.lock().await;
        if let Some(external) = &request.external_customer_id {
            if rows
                .iter()
                .any(|c| c.app_id == app_id && c.external_customer_id.as_deref() == Some(external))
            {
                return Err(Error::conflict(
                    "customer with this external_customer_id already exists",
                ));
            }
        }
        let customer = Customer {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            external_customer_id: request.external_customer_id.clone(),
            psp_customer_id: None,
            email: request.email.clone(),
            name: request.name.clone(),
            default_payment_method_token: None,
            default_payment_method_type: None,
            status: CustomerStatus::Active,
            delinquent_since: None,
            metadata: request.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rows.push(customer.clone());
        Ok(customer)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Customer>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|c| c.app_id == app_id && c.id == id)
            .cloned())
    }

    async fn find_by_external_id(
        &self,
        app_id: &str,
        external_customer_id: &str,
    ) -> Result<Option<Customer>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|c| {
                c.app_id == app_id
                    && c.external_customer_id.as_deref() == Some(external_customer_id)
            })
            .cloned())
    }

    async fn find_by_psp_id(
        &self,
        app_id: &str,
        psp_customer_id: &str,
    ) -> Result<Option<Customer>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|c| c.app_id == app_id && c.psp_customer_id.as_deref() == Some(psp_customer_id))
            .cloned())
    }

    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateCustomerRequest,
    ) -> Result<Customer> {
        let mut rows = self.rows.lock().await;
        let customer = rows
            .iter_mut()
            .find(|c| c.app_id == app_id && c.id == id)
            .ok_or_else(|| Error::not_found("Customer not found"))?;
        if let Some(email) = &request.email {
            customer.email = email.clone();
        }
        if let Some(name) = &request.name {
            customer.name = name.clone();
        }
        if let Some(metadata) = &request.metadata {
            customer.metadata = metadata.clone();
        }
        customer.updated_at = Utc::now();
        Ok(customer.clone())
    }

    async fn set_psp_customer_id(
        &self,
        app_id: &str,
        id: Uuid,
        psp_customer_id: &str,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(customer) = rows.iter_mut().find(|c| c.app_id == app_id && c.id == id) {
            customer.psp_customer_id = Some(psp_customer_id.to_string());
        }
        Ok(())
    }

    async fn set_status(&self, app_id: &str, id: Uuid, status: CustomerStatus) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(customer) = rows.iter_mut().find(|c| c.app_id == app_id && c.id == id) {
            customer.status = status;
        }
        Ok(())
    }

    async fn clear_default_payment_method(&self, app_id: &str, id: Uuid) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(customer) = rows.iter_mut().find(|c| c.app_id == app_id && c.id == id) {
            customer.default_payment_method_token = None;
            customer.default_payment_method_type = None;
        }
        Ok(())
    }
}

pub struct MemPaymentMethodRepository {
    pub rows: Mutex<Vec<PaymentMethod>>,
    customers: Arc<MemCustomerRepository>,
}

impl MemPaymentMethodRepository {
    pub fn new(customers: Arc<MemCustomerRepository>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            customers,
        })
    }
}

#[async_trait]
impl PaymentMethodRepository for MemPaymentMethodRepository {
    async fn upsert_by_psp_id(
        &self,
        app_id: &str,
        customer_id: Uuid,
        psp_payment_method_id: &str,
        method_type: PaymentMethodType,
        details: &MaskedDetails,
    ) -> Result<PaymentMethod> {
        let mut rows = self.rows.lock().await;
        if let Some(existing) = rows
            .iter_mut()
            .find(|m| m.app_id == app_id && m.psp_payment_method_id == psp_payment_method_id)
        {
            existing.customer_id = customer_id;
            existing.deleted_at = None;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }
        let method = PaymentMethod {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            customer_id,
            psp_payment_method_id: psp_payment_method_id.to_string(),
            method_type,
            brand: details.brand.clone(),
            last4: details.last4.clone(),
            exp_month: details.exp_month,
            exp_year: details.exp_year,
            bank_name: details.bank_name.clone(),
            bank_last4: details.bank_last4.clone(),
            is_default: false,
            deleted_at: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rows.push(method.clone());
        Ok(method)
    }

    async fn find_by_psp_id(
        &self,
        app_id: &str,
        psp_payment_method_id: &str,
    ) -> Result<Option<PaymentMethod>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|m| m.app_id == app_id && m.psp_payment_method_id == psp_payment_method_id)
            .cloned())
    }

    async fn list_active(&self, app_id: &str, customer_id: Uuid) -> Result<Vec<PaymentMethod>> {
        let mut methods: Vec<PaymentMethod> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|m| {
                m.app_id == app_id && m.customer_id == customer_id && m.deleted_at.is_none()
            })
            .cloned()
            .collect();
        methods.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(methods)
    }

    async fn soft_delete(
        &self,
        app_id: &str,
        psp_payment_method_id: &str,
    ) -> Result<PaymentMethod> {
        let mut rows = self.rows.lock().await;
        let method = rows
            .iter_mut()
            .find(|m| {
                m.app_id == app_id
                    && m.psp_payment_method_id == psp_payment_method_id
                    && m.deleted_at.is_none()
            })
            .ok_or_else(|| Error::not_found("Payment method not found"))?;
        method.deleted_at = Some(Utc::now());
        let was_default = method.is_default;
        method.is_default = false;
        let mut deleted = method.clone();
        deleted.is_default = was_default;
        Ok(deleted)
    }

    async fn set_default(
        &self,
        app_id: &str,
        customer_id: Uuid,
        psp_payment_method_id: &str,
    ) -> Result<PaymentMethod> {
        let mut rows = self.rows.lock().await;
        for method in rows
            .iter_mut()
            .filter(|m| m.app_id == app_id && m.customer_id == customer_id)
        {
            method.is_default = false;
        }
        let method = rows
            .iter_mut()
            .find(|m| {
                m.app_id == app_id
                    && m.customer_id == customer_id
                    && m.psp_payment_method_id == psp_payment_method_id
                    && m.deleted_at.is_none()
            })
            .ok_or_else(|| Error::not_found("Payment method not found"))?;
        method.is_default = true;
        let method = method.clone();
        drop(rows);

        let mut customers = self.customers.rows.lock().await;
        if let Some(customer) = customers
            .iter_mut()
            .find(|c| c.app_id == app_id && c.id == customer_id)
        {
            customer.default_payment_method_token = Some(method.psp_payment_method_id.clone());
            customer.default_payment_method_type = Some(method.method_type);
        }
        Ok(method)
    }
}

#[derive(Default)]
pub struct MemSubscriptionRepository {
    pub rows: Mutex<Vec<Subscription>>,
    pub proration_events: Mutex<Vec<(String, Uuid, String, i64)>>,
}

impl MemSubscriptionRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn materialize(app_id: &str, new: &NewSubscription) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            customer_id: new.customer_id,
            psp_subscription_id: new.psp_subscription_id.clone(),
            plan_id: new.plan_id.clone(),
            plan_name: new.plan_name.clone(),
            price_cents: new.price_cents,
            status: new.status,
            interval_unit: new.interval_unit,
            interval_count: new.interval_count,
            billing_cycle_anchor: new.billing_cycle_anchor,
            current_period_start: new.current_period_start,
            current_period_end: new.current_period_end,
            cancel_at_period_end: false,
            cancel_at: None,
            canceled_at: None,
            ended_at: None,
            payment_method_token: new.payment_method_token.clone(),
            payment_method_type: new.payment_method_type,
            metadata: new.metadata.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl SubscriptionRepository for MemSubscriptionRepository {
    async fn create(&self, app_id: &str, subscription: &NewSubscription) -> Result<Subscription> {
        let row = Self::materialize(app_id, subscription);
        self.rows.lock().await.push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|s| s.app_id == app_id && s.id == id)
            .cloned())
    }

    async fn find_by_psp_id(
        &self,
        app_id: &str,
        psp_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|s| {
                s.app_id == app_id && s.psp_subscription_id.as_deref() == Some(psp_subscription_id)
            })
            .cloned())
    }

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Subscription>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|s| s.app_id == app_id && customer_id.map_or(true, |c| s.customer_id == c))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateSubscriptionRequest,
    ) -> Result<Subscription> {
        let mut rows = self.rows.lock().await;
        let sub = rows
            .iter_mut()
            .find(|s| s.app_id == app_id && s.id == id)
            .ok_or_else(|| Error::not_found("Subscription not found"))?;
        if let Some(plan_id) = &request.plan_id {
            sub.plan_id = plan_id.clone();
        }
        if let Some(plan_name) = &request.plan_name {
            sub.plan_name = plan_name.clone();
        }
        if let Some(price) = request.price_cents {
            sub.price_cents = price;
        }
        if let Some(metadata) = &request.metadata {
            sub.metadata = metadata.clone();
        }
        sub.updated_at = Utc::now();
        Ok(sub.clone())
    }

    async fn set_cancel_at_period_end(&self, app_id: &str, id: Uuid) -> Result<Subscription> {
        let mut rows = self.rows.lock().await;
        let sub = rows
            .iter_mut()
            .find(|s| s.app_id == app_id && s.id == id)
            .ok_or_else(|| Error::not_found("Subscription not found"))?;
        sub.cancel_at_period_end = true;
        sub.cancel_at = Some(sub.current_period_end);
        Ok(sub.clone())
    }

    async fn cancel_now(
        &self,
        app_id: &str,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let mut rows = self.rows.lock().await;
        let sub = rows
            .iter_mut()
            .find(|s| s.app_id == app_id && s.id == id)
            .ok_or_else(|| Error::not_found("Subscription not found"))?;
        sub.status = SubscriptionStatus::Canceled;
        sub.canceled_at = Some(now);
        sub.ended_at = Some(now);
        Ok(sub.clone())
    }

    async fn swap_cycle(
        &self,
        app_id: &str,
        old_id: Uuid,
        replacement: &NewSubscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let mut rows = self.rows.lock().await;
        let old = rows
            .iter_mut()
            .find(|s| s.app_id == app_id && s.id == old_id)
            .ok_or_else(|| Error::not_found("Subscription not found"))?;
        old.status = SubscriptionStatus::Canceled;
        old.canceled_at = Some(now);
        old.ended_at = Some(now);
        let row = Self::materialize(app_id, replacement);
        rows.push(row.clone());
        Ok(row)
    }

    async fn sync_by_psp_id(
        &self,
        app_id: &str,
        psp_subscription_id: &str,
        sync: &SubscriptionSync,
    ) -> Result<Option<Subscription>> {
        let mut rows = self.rows.lock().await;
        let Some(sub) = rows.iter_mut().find(|s| {
            s.app_id == app_id && s.psp_subscription_id.as_deref() == Some(psp_subscription_id)
        }) else {
            return Ok(None);
        };
        if let Some(status) = sync.status {
            sub.status = status;
        }
        if let Some(start) = sync.current_period_start {
            sub.current_period_start = start;
        }
        if let Some(end) = sync.current_period_end {
            sub.current_period_end = end;
        }
        if let Some(cape) = sync.cancel_at_period_end {
            sub.cancel_at_period_end = cape;
        }
        sub.canceled_at = sync.canceled_at.or(sub.canceled_at);
        sub.ended_at = sync.ended_at.or(sub.ended_at);
        sub.updated_at = Utc::now();
        Ok(Some(sub.clone()))
    }

    async fn record_proration_event(
        &self,
        app_id: &str,
        subscription_id: Uuid,
        kind: &str,
        amount_cents: i64,
        _metadata: &serde_json::Value,
    ) -> Result<()> {
        self.proration_events.lock().await.push((
            app_id.to_string(),
            subscription_id,
            kind.to_string(),
            amount_cents,
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemChargeRepository {
    pub rows: Mutex<Vec<Charge>>,
}

impl MemChargeRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed_succeeded(&self, app_id: &str, customer_id: Uuid, amount: i64) -> Charge {
        let charge = Charge {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            customer_id,
            subscription_id: None,
            invoice_id: None,
            psp_charge_id: Some(format!("ch_{}", Uuid::new_v4().simple())),
            status: ChargeStatus::Succeeded,
            amount_cents: amount,
            currency: "usd".to_string(),
            reason: None,
            reference_id: Some(format!("seed:{}", Uuid::new_v4().simple())),
            service_date: None,
            note: None,
            failure_code: None,
            failure_message: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.rows.lock().await.push(charge.clone());
        charge
    }
}

#[async_trait]
impl ChargeRepository for MemChargeRepository {
    async fn insert_pending(&self, app_id: &str, charge: &NewCharge) -> Result<Charge> {
        let mut rows = self.rows.lock().await;
        if let Some(reference) = &charge.reference_id {
            if rows
                .iter()
                .any(|c| c.app_id == app_id && c.reference_id.as_deref() == Some(reference))
            {
                return Err(Error::conflict("charge with this reference_id already exists"));
            }
        }
        let row = Charge {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            customer_id: charge.customer_id,
            subscription_id: charge.subscription_id,
            invoice_id: None,
            psp_charge_id: None,
            status: ChargeStatus::Pending,
            amount_cents: charge.amount_cents,
            currency: charge.currency.clone(),
            reason: charge.reason.clone(),
            reference_id: charge.reference_id.clone(),
            service_date: charge.service_date,
            note: charge.note.clone(),
            failure_code: None,
            failure_message: None,
            metadata: charge.metadata.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Charge>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|c| c.app_id == app_id && c.id == id)
            .cloned())
    }

    async fn find_by_reference(
        &self,
        app_id: &str,
        reference_id: &str,
    ) -> Result<Option<Charge>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|c| c.app_id == app_id && c.reference_id.as_deref() == Some(reference_id))
            .cloned())
    }

    async fn find_by_psp_id(&self, app_id: &str, psp_charge_id: &str) -> Result<Option<Charge>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|c| c.app_id == app_id && c.psp_charge_id.as_deref() == Some(psp_charge_id))
            .cloned())
    }

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Charge>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|c| c.app_id == app_id && customer_id.map_or(true, |id| c.customer_id == id))
            .cloned()
            .collect())
    }

    async fn mark_succeeded(
        &self,
        app_id: &str,
        id: Uuid,
        psp_charge_id: &str,
    ) -> Result<Charge> {
        let mut rows = self.rows.lock().await;
        let charge = rows
            .iter_mut()
            .find(|c| c.app_id == app_id && c.id == id)
            .ok_or_else(|| Error::not_found("Charge not found"))?;
        charge.status = ChargeStatus::Succeeded;
        charge.psp_charge_id = Some(psp_charge_id.to_string());
        Ok(charge.clone())
    }

    async fn mark_failed(
        &self,
        app_id: &str,
        id: Uuid,
        failure_code: &str,
        failure_message: &str,
    ) -> Result<Charge> {
        let mut rows = self.rows.lock().await;
        let charge = rows
            .iter_mut()
            .find(|c| c.app_id == app_id && c.id == id)
            .ok_or_else(|| Error::not_found("Charge not found"))?;
        charge.status = ChargeStatus::Failed;
        charge.failure_code = Some(failure_code.to_string());
        charge.failure_message = Some(failure_message.to_string());
        Ok(charge.clone())
    }

    async fn sync_status_by_psp_id(
        &self,
        app_id: &str,
        psp_charge_id: &str,
        status: ChargeStatus,
        failure_code: Option<&str>,
        failure_message: Option<&str>,
    ) -> Result<Option<Charge>> {
        let mut rows = self.rows.lock().await;
        let Some(charge) = rows
            .iter_mut()
            .find(|c| c.app_id == app_id && c.psp_charge_id.as_deref() == Some(psp_charge_id))
        else {
            return Ok(None);
        };
        charge.status = status;
        if let Some(code) = failure_code {
            charge.failure_code = Some(code.to_string());
        }
        if let Some(message) = failure_message {
            charge.failure_message = Some(message.to_string());
        }
        Ok(Some(charge.clone()))
    }
}

#[derive(Default)]
pub struct MemRefundRepository {
    pub rows: Mutex<Vec<Refund>>,
}

impl MemRefundRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RefundRepository for MemRefundRepository {
    async fn insert_pending(&self, app_id: &str, refund: &NewRefund) -> Result<Refund> {
        let mut rows = self.rows.lock().await;
        if rows
            .iter()
            .any(|r| r.app_id == app_id && r.reference_id == refund.reference_id)
        {
            return Err(Error::conflict("refund with this reference_id already exists"));
        }
        let row = Refund {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            customer_id: refund.customer_id,
            charge_id: refund.charge_id,
            psp_refund_id: None,
            status: RefundStatus::Pending,
            amount_cents: refund.amount_cents,
            currency: refund.currency.clone(),
            reason: refund.reason.clone(),
            reference_id: refund.reference_id.clone(),
            failure_code: None,
            failure_message: None,
            metadata: refund.metadata.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Refund>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|r| r.app_id == app_id && r.id == id)
            .cloned())
    }

    async fn find_by_reference(
        &self,
        app_id: &str,
        reference_id: &str,
    ) -> Result<Option<Refund>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|r| r.app_id == app_id && r.reference_id == reference_id)
            .cloned())
    }

    async fn list(&self, app_id: &str, charge_id: Option<Uuid>) -> Result<Vec<Refund>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.app_id == app_id && charge_id.map_or(true, |id| r.charge_id == id))
            .cloned()
            .collect())
    }

    async fn mark_succeeded(
        &self,
        app_id: &str,
        id: Uuid,
        psp_refund_id: &str,
    ) -> Result<Refund> {
        let mut rows = self.rows.lock().await;
        let refund = rows
            .iter_mut()
            .find(|r| r.app_id == app_id && r.id == id)
            .ok_or_else(|| Error::not_found("Refund not found"))?;
        refund.status = RefundStatus::Succeeded;
        refund.psp_refund_id = Some(psp_refund_id.to_string());
        Ok(refund.clone())
    }

    async fn mark_failed(
        &self,
        app_id: &str,
        id: Uuid,
        failure_code: &str,
        failure_message: &str,
    ) -> Result<Refund> {
        let mut rows = self.rows.lock().await;
        let refund = rows
            .iter_mut()
            .find(|r| r.app_id == app_id && r.id == id)
            .ok_or_else(|| Error::not_found("Refund not found"))?;
        refund.status = RefundStatus::Failed;
        refund.failure_code = Some(failure_code.to_string());
        refund.failure_message = Some(failure_message.to_string());
        Ok(refund.clone())
    }

    async fn sync_status_by_psp_id(
        &self,
        app_id: &str,
        psp_refund_id: &str,
        status: RefundStatus,
    ) -> Result<Option<Refund>> {
        let mut rows = self.rows.lock().await;
        let Some(refund) = rows
            .iter_mut()
            .find(|r| r.app_id == app_id && r.psp_refund_id.as_deref() == Some(psp_refund_id))
        else {
            return Ok(None);
        };
        refund.status = status;
        Ok(Some(refund.clone()))
    }
}

#[derive(Default)]
pub struct MemCouponRepository {
    pub rows: Mutex<Vec<Coupon>>,
    pub applications: Mutex<Vec<(String, Uuid, i64, i64)>>,
}

impl MemCouponRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed(&self, coupon: Coupon) {
        self.rows.lock().await.push(coupon);
    }
}

#[async_trait]
impl CouponRepository for MemCouponRepository {
    async fn create(&self, app_id: &str, request: &CreateCouponRequest) -> Result<Coupon> {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|c| c.app_id == app_id && c.code == request.code) {
            return Err(Error::conflict("coupon code already exists"));
        }
        let coupon = Coupon {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            code: request.code.clone(),
            coupon_type: request.coupon_type,
            value: request.value,
            active: true,
            redeem_by: request.redeem_by,
            max_redemptions: request.max_redemptions,
            redemption_count: 0,
            product_categories: request.product_categories.as_ref().map(|v| serde_json::json!(v)),
            customer_segments: request.customer_segments.as_ref().map(|v| serde_json::json!(v)),
            min_quantity: request.min_quantity,
            max_discount_cents: request.max_discount_cents,
            seasonal_start: request.seasonal_start,
            seasonal_end: request.seasonal_end,
            volume_tiers: request
                .volume_tiers
                .as_ref()
                .map(|v| serde_json::to_value(v).unwrap_or_default()),
            stackable: request.stackable,
            priority: request.priority,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rows.push(coupon.clone());
        Ok(coupon)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Coupon>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|c| c.app_id == app_id && c.id == id)
            .cloned())
    }

    async fn find_by_code(&self, app_id: &str, code: &str) -> Result<Option<Coupon>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|c| c.app_id == app_id && c.code == code)
            .cloned())
    }

    async fn find_by_codes(&self, app_id: &str, codes: &[String]) -> Result<Vec<Coupon>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|c| c.app_id == app_id && codes.contains(&c.code))
            .cloned()
            .collect())
    }

    async fn list(&self, app_id: &str) -> Result<Vec<Coupon>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|c| c.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateCouponRequest,
    ) -> Result<Coupon> {
        let mut rows = self.rows.lock().await;
        let coupon = rows
            .iter_mut()
            .find(|c| c.app_id == app_id && c.id == id)
            .ok_or_else(|| Error::not_found("Coupon not found"))?;
        if let Some(active) = request.active {
            coupon.active = active;
        }
        if let Some(value) = request.value {
            coupon.value = value;
        }
        Ok(coupon.clone())
    }

    async fn increment_redemptions(&self, app_id: &str, id: Uuid) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(coupon) = rows.iter_mut().find(|c| c.app_id == app_id && c.id == id) {
            coupon.redemption_count += 1;
        }
        Ok(())
    }

    async fn record_application(
        &self,
        app_id: &str,
        coupon_id: Uuid,
        _coupon_code: &str,
        _invoice_id: Option<&str>,
        _charge_id: Option<Uuid>,
        subtotal_cents: i64,
        discount_cents: i64,
    ) -> Result<()> {
        self.applications.lock().await.push((
            app_id.to_string(),
            coupon_id,
            subtotal_cents,
            discount_cents,
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemTaxRateRepository {
    pub rows: Mutex<Vec<TaxRate>>,
    pub calculations: Mutex<Vec<(String, String, i64, i64)>>,
}

impl MemTaxRateRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed(&self, rate: TaxRate) {
        self.rows.lock().await.push(rate);
    }
}

#[async_trait]
impl TaxRateRepository for MemTaxRateRepository {
    async fn create(&self, app_id: &str, request: &CreateTaxRateRequest) -> Result<TaxRate> {
        let rate = TaxRate {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            jurisdiction_code: request.jurisdiction_code.clone(),
            tax_type: request.tax_type.clone(),
            rate: request.rate,
            effective_date: request.effective_date,
            expiration_date: request.expiration_date,
            description: request.description.clone(),
            created_at: Utc::now(),
        };
        self.rows.lock().await.push(rate.clone());
        Ok(rate)
    }

    async fn list(&self, app_id: &str) -> Result<Vec<TaxRate>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn list_for_jurisdiction(
        &self,
        app_id: &str,
        jurisdiction_code: &str,
    ) -> Result<Vec<TaxRate>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.app_id == app_id && r.jurisdiction_code == jurisdiction_code)
            .cloned()
            .collect())
    }

    async fn record_calculation(
        &self,
        app_id: &str,
        _invoice_id: Option<&str>,
        _charge_id: Option<Uuid>,
        jurisdiction_code: &str,
        taxable_cents: i64,
        tax_cents: i64,
        _breakdown: &serde_json::Value,
    ) -> Result<()> {
        self.calculations.lock().await.push((
            app_id.to_string(),
            jurisdiction_code.to_string(),
            taxable_cents,
            tax_cents,
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemDisputeRepository {
    pub rows: Mutex<Vec<Dispute>>,
}

impl MemDisputeRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DisputeRepository for MemDisputeRepository {
    async fn upsert_by_psp_id(&self, app_id: &str, dispute: &DisputeUpsert) -> Result<Dispute> {
        let mut rows = self.rows.lock().await;
        if let Some(existing) = rows
            .iter_mut()
            .find(|d| d.app_id == app_id && d.psp_dispute_id == dispute.psp_dispute_id)
        {
            existing.status = dispute.status.clone();
            existing.amount_cents = dispute.amount_cents;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }
        let row = Dispute {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            customer_id: dispute.customer_id,
            charge_id: dispute.charge_id,
            psp_dispute_id: dispute.psp_dispute_id.clone(),
            status: dispute.status.clone(),
            amount_cents: dispute.amount_cents,
            currency: dispute.currency.clone(),
            reason: dispute.reason.clone(),
            evidence_due_by: dispute.evidence_due_by,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Dispute>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|d| d.app_id == app_id && d.id == id)
            .cloned())
    }

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Dispute>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|d| d.app_id == app_id && customer_id.map_or(true, |id| d.customer_id == id))
            .cloned()
            .collect())
    }
}
