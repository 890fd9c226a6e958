//! Payment Method Service
//!
//! Attach flow: verify the customer, attach the token at the PSP
//! (fail-fast), fetch masked display fields (best-effort; the PSP keeps
//! the authoritative detail), then upsert locally. Re-adding a deleted
//! token re-attaches it. Delete is a local soft-delete with a
//! best-effort PSP detach; local truth prevails.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{AddPaymentMethodRequest, PaymentMethod, PaymentMethodType};
use crate::psp::PspClient;
use crate::repository::payment_method_repository::MaskedDetails;
use crate::repository::{CustomerRepository, PaymentMethodRepository};
use crate::services::CustomerService;
use crate::{Error, Result};

#[derive(Clone)]
pub struct PaymentMethodService {
    payment_methods: Arc<dyn PaymentMethodRepository>,
    customers: Arc<dyn CustomerRepository>,
    customer_service: CustomerService,
    psp: Arc<dyn PspClient>,
}

impl PaymentMethodService {
    pub fn new(
        payment_methods: Arc<dyn PaymentMethodRepository>,
        customers: Arc<dyn CustomerRepository>,
        customer_service: CustomerService,
        psp: Arc<dyn PspClient>,
    ) -> Self {
        Self {
            payment_methods,
            customers,
            customer_service,
            psp,
        }
    }

    pub async fn add(&self, app: &AppConfig, request: &AddPaymentMethodRequest) -> Result<PaymentMethod> {
        let customer = self
            .customers
            .find_by_id(&app.app_id, request.customer_id)
            .await?
            .ok_or_else(|| Error::not_found("Customer not found"))?;

        let psp_customer_id = self
            .customer_service
            .ensure_psp_customer(app, &customer)
            .await?;

        self.psp
            .attach_payment_method(app, &psp_customer_id, &request.payment_method_token)
            .await?;

        // Masked detail fetch is best-effort; a minimal row still works.
        let (method_type, details) = match self
            .psp
            .get_payment_method(app, &request.payment_method_token)
            .await
        {
            Ok(psp_method) => (
                psp_method.method_type,
                MaskedDetails {
                    brand: psp_method.brand,
                    last4: psp_method.last4,
                    exp_month: psp_method.exp_month,
                    exp_year: psp_method.exp_year,
                    bank_name: psp_method.bank_name,
                    bank_last4: psp_method.bank_last4,
                },
            ),
            Err(e) => {
                warn!(
                    app_id = %app.app_id,
                    customer_id = %customer.id,
                    error = %e,
                    "masked detail fetch failed; storing minimal payment method"
                );
                (PaymentMethodType::Card, MaskedDetails::default())
            }
        };

        let method = self
            .payment_methods
            .upsert_by_psp_id(
                &app.app_id,
                customer.id,
                &request.payment_method_token,
                method_type,
                &details,
            )
            .await?;

        if request.set_default.unwrap_or(false) {
            return self
                .payment_methods
                .set_default(&app.app_id, customer.id, &request.payment_method_token)
                .await;
        }

        Ok(method)
    }

    pub async fn list(&self, app_id: &str, customer_id: Uuid) -> Result<Vec<PaymentMethod>> {
        self.customers
            .find_by_id(app_id, customer_id)
            .await?
            .ok_or_else(|| Error::not_found("Customer not found"))?;
        self.payment_methods.list_active(app_id, customer_id).await
    }

    pub async fn delete(&self, app: &AppConfig, psp_payment_method_id: &str) -> Result<PaymentMethod> {
        let deleted = self
            .payment_methods
            .soft_delete(&app.app_id, psp_payment_method_id)
            .await?;

        if deleted.is_default {
            self.customers
                .clear_default_payment_method(&app.app_id, deleted.customer_id)
                .await?;
        }

        if let Err(e) = self
            .psp
            .detach_payment_method(app, psp_payment_method_id)
            .await
        {
            warn!(
                app_id = %app.app_id,
                customer_id = %deleted.customer_id,
                psp_payment_method_id,
                error = %e,
                divergence_risk = "low",
                "PSP detach failed; local soft delete stands"
            );
        }

        Ok(deleted)
    }
}
