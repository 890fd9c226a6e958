//! State Service
//!
//! Composes the per-customer snapshot consumed by tenant applications:
//! customer, most relevant subscription, payment summary, an access
//! verdict, and the entitlements configured for the active plan.

use std::sync::Arc;

use serde::Serialize;

use crate::config::AppConfig;
use crate::models::{Customer, CustomerStatus, PaymentMethod, Subscription};
use crate::repository::{CustomerRepository, PaymentMethodRepository, SubscriptionRepository};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Full,
    Locked,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub customer: Customer,
    pub subscription: Option<Subscription>,
    pub payment: Option<PaymentMethod>,
    pub access: Access,
    pub entitlements: Vec<String>,
}

#[derive(Clone)]
pub struct StateService {
    customers: Arc<dyn CustomerRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    payment_methods: Arc<dyn PaymentMethodRepository>,
}

impl StateService {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        payment_methods: Arc<dyn PaymentMethodRepository>,
    ) -> Self {
        Self {
            customers,
            subscriptions,
            payment_methods,
        }
    }

    pub async fn snapshot(&self, app: &AppConfig, external_customer_id: &str) -> Result<StateSnapshot> {
        let customer = self
            .customers
            .find_by_external_id(&app.app_id, external_customer_id)
            .await?
            .ok_or_else(|| Error::not_found("Customer not found"))?;

        let mut subscriptions = self
            .subscriptions
            .list(&app.app_id, Some(customer.id))
            .await?;
        // Prefer a live subscription; otherwise surface the newest.
        subscriptions.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        let subscription = subscriptions
            .iter()
            .find(|s| s.status.grants_access())
            .cloned()
            .or_else(|| subscriptions.into_iter().next());

        let payment = self
            .payment_methods
            .list_active(&app.app_id, customer.id)
            .await?
            .into_iter()
            .next();

        let access = match (&customer.status, &subscription) {
            (CustomerStatus::Active, Some(s)) if s.status.grants_access() => Access::Full,
            _ => Access::Locked,
        };

        let entitlements = subscription
            .as_ref()
            .and_then(|s| app.entitlements.get(&s.plan_id))
            .cloned()
            .unwrap_or_default();

        Ok(StateSnapshot {
            customer,
            subscription,
            payment,
            access,
            entitlements,
        })
    }
}
