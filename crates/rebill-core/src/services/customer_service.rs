//! Customer Service
//!
//! Customers are created local-first: the row commits before the PSP
//! profile exists, and `psp_customer_id` is backfilled best-effort. A
//! failed backfill is logged with enough context to reconcile later and
//! never fails the request.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{
    CreateCustomerRequest, Customer, PaymentMethod, SetDefaultPaymentMethodRequest,
    UpdateCustomerRequest,
};
use crate::psp::PspClient;
use crate::repository::{CustomerRepository, PaymentMethodRepository};
use crate::{Error, Result};

#[derive(Clone)]
pub struct CustomerService {
    customers: Arc<dyn CustomerRepository>,
    payment_methods: Arc<dyn PaymentMethodRepository>,
    psp: Arc<dyn PspClient>,
}

impl CustomerService {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        payment_methods: Arc<dyn PaymentMethodRepository>,
        psp: Arc<dyn PspClient>,
    ) -> Self {
        Self {
            customers,
            payment_methods,
            psp,
        }
    }

    pub async fn create(&self, app: &AppConfig, request: &CreateCustomerRequest) -> Result<Customer> {
        let mut customer = self.customers.create(&app.app_id, request).await?;

        match self
            .psp
            .create_customer(app, &customer.email, &customer.name)
            .await
        {
            Ok(psp_customer) => {
                self.customers
                    .set_psp_customer_id(&app.app_id, customer.id, &psp_customer.id)
                    .await?;
                customer.psp_customer_id = Some(psp_customer.id);
            }
            Err(e) => {
                warn!(
                    app_id = %app.app_id,
                    customer_id = %customer.id,
                    error = %e,
                    divergence_risk = "low",
                    "PSP customer creation failed; will backfill on next use"
                );
            }
        }

        Ok(customer)
    }

    pub async fn get(&self, app_id: &str, id: Uuid) -> Result<Customer> {
        self.customers
            .find_by_id(app_id, id)
            .await?
            .ok_or_else(|| Error::not_found("Customer not found"))
    }

    pub async fn get_by_external_id(
        &self,
        app_id: &str,
        external_customer_id: &str,
    ) -> Result<Customer> {
        self.customers
            .find_by_external_id(app_id, external_customer_id)
            .await?
            .ok_or_else(|| Error::not_found("Customer not found"))
    }

    pub async fn update(
        &self,
        app: &AppConfig,
        id: Uuid,
        request: &UpdateCustomerRequest,
    ) -> Result<Customer> {
        let customer = self.customers.update(&app.app_id, id, request).await?;

        // Best-effort PSP sync; an email change that fails to propagate is
        // flagged high because receipts go to the wrong address.
        if request.email.is_some() || request.name.is_some() {
            if let Some(psp_customer_id) = customer.psp_customer_id.as_deref() {
                if let Err(e) = self
                    .psp
                    .update_customer(
                        app,
                        psp_customer_id,
                        request.email.as_deref(),
                        request.name.as_deref(),
                    )
                    .await
                {
                    warn!(
                        app_id = %app.app_id,
                        customer_id = %customer.id,
                        psp_customer_id = %psp_customer_id,
                        error = %e,
                        divergence_risk = if request.email.is_some() { "high" } else { "low" },
                        "PSP customer sync failed"
                    );
                }
            }
        }

        Ok(customer)
    }

    /// Point the customer's default at an attached method. The flag flip,
    /// the sibling clears, and the denormalized fast path all commit in
    /// one transaction inside the repository.
    pub async fn set_default_payment_method(
        &self,
        app: &AppConfig,
        customer_id: Uuid,
        request: &SetDefaultPaymentMethodRequest,
    ) -> Result<PaymentMethod> {
        self.get(&app.app_id, customer_id).await?;

        self.payment_methods
            .set_default(&app.app_id, customer_id, &request.payment_method_token)
            .await
    }

    /// Ensure the customer has a PSP profile, creating one on demand.
    pub async fn ensure_psp_customer(&self, app: &AppConfig, customer: &Customer) -> Result<String> {
        if let Some(id) = customer.psp_customer_id.as_deref() {
            return Ok(id.to_string());
        }

        let psp_customer = self
            .psp
            .create_customer(app, &customer.email, &customer.name)
            .await?;
        self.customers
            .set_psp_customer_id(&app.app_id, customer.id, &psp_customer.id)
            .await?;
        Ok(psp_customer.id)
    }
}
