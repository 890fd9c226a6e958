//! Charge Service
//!
//! One-time charges with domain idempotency. The sequence is load-bearing:
//!
//! 1. pre-check by `(app_id, reference_id)`; an existing row is returned
//!    without touching the PSP
//! 2. commit a local `pending` row
//! 3. losing the insert race to a concurrent request means re-reading the
//!    winner's row, again without a PSP call
//! 4. only then call the PSP; failure persists a `failed` row for audit
//!    and surfaces the PSP's code and message

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{Charge, CreateChargeRequest, Customer};
use crate::psp::PspClient;
use crate::repository::charge_repository::NewCharge;
use crate::repository::{ChargeRepository, CustomerRepository};
use crate::{Error, Result};

#[derive(Clone)]
pub struct ChargeService {
    charges: Arc<dyn ChargeRepository>,
    customers: Arc<dyn CustomerRepository>,
    psp: Arc<dyn PspClient>,
}

impl ChargeService {
    pub fn new(
        charges: Arc<dyn ChargeRepository>,
        customers: Arc<dyn CustomerRepository>,
        psp: Arc<dyn PspClient>,
    ) -> Self {
        Self {
            charges,
            customers,
            psp,
        }
    }

    pub async fn create_one_time(
        &self,
        app: &AppConfig,
        request: &CreateChargeRequest,
    ) -> Result<Charge> {
        if request.amount_cents <= 0 {
            return Err(Error::validation("amount_cents must be a positive integer"));
        }
        if request.reference_id.trim().is_empty() {
            return Err(Error::validation("reference_id is required"));
        }

        let customer = self.resolve_customer(app, request).await?;

        // Domain-idempotency pre-check: the reference may already be settled.
        if let Some(existing) = self
            .charges
            .find_by_reference(&app.app_id, &request.reference_id)
            .await?
        {
            info!(
                app_id = %app.app_id,
                reference_id = %request.reference_id,
                charge_id = %existing.id,
                "returning existing charge for reference_id"
            );
            return Ok(existing);
        }

        let new_charge = NewCharge {
            customer_id: customer.id,
            subscription_id: None,
            amount_cents: request.amount_cents,
            currency: request
                .currency
                .clone()
                .unwrap_or_else(|| "usd".to_string()),
            reason: request.reason.clone(),
            reference_id: Some(request.reference_id.clone()),
            service_date: request.service_date,
            note: request.note.clone(),
            metadata: request.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
        };

        let pending = match self.charges.insert_pending(&app.app_id, &new_charge).await {
            Ok(pending) => pending,
            Err(e) if e.is_unique_violation() => {
                // A concurrent request with the same reference won the
                // insert; its row is the single outcome.
                return self
                    .charges
                    .find_by_reference(&app.app_id, &request.reference_id)
                    .await?
                    .ok_or_else(|| Error::internal("charge vanished after reference race"));
            }
            Err(e) => return Err(e),
        };

        self.settle(app, &customer, pending).await
    }

    /// The pending row is committed; now let the PSP decide.
    async fn settle(&self, app: &AppConfig, customer: &Customer, pending: Charge) -> Result<Charge> {
        let psp_customer_id = customer
            .psp_customer_id
            .as_deref()
            .ok_or_else(|| Error::conflict("customer has no payment profile at the processor"))?;
        let token = customer
            .default_payment_method_token
            .as_deref()
            .ok_or_else(|| Error::conflict("customer has no default payment method"))?;

        match self
            .psp
            .create_charge(
                app,
                psp_customer_id,
                token,
                pending.amount_cents,
                &pending.currency,
                pending.reference_id.as_deref().unwrap_or_default(),
            )
            .await
        {
            Ok(psp_charge) => {
                self.charges
                    .mark_succeeded(&app.app_id, pending.id, &psp_charge.id)
                    .await
            }
            Err(Error::PaymentProcessor { code, message }) => {
                // The failed row persists for audit and reconciliation.
                self.charges
                    .mark_failed(&app.app_id, pending.id, &code, &message)
                    .await?;
                Err(Error::PaymentProcessor { code, message })
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_customer(
        &self,
        app: &AppConfig,
        request: &CreateChargeRequest,
    ) -> Result<Customer> {
        let customer = if let Some(id) = request.customer_id {
            self.customers.find_by_id(&app.app_id, id).await?
        } else if let Some(external) = &request.external_customer_id {
            self.customers
                .find_by_external_id(&app.app_id, external)
                .await?
        } else {
            return Err(Error::validation(
                "customer_id or external_customer_id is required",
            ));
        };

        customer.ok_or_else(|| Error::not_found("Customer not found"))
    }

    pub async fn get(&self, app_id: &str, id: Uuid) -> Result<Charge> {
        self.charges
            .find_by_id(app_id, id)
            .await?
            .ok_or_else(|| Error::not_found("Charge not found"))
    }

    pub async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Charge>> {
        self.charges.list(app_id, customer_id).await
    }
}
