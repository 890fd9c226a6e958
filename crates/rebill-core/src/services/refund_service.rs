//! Refund Service
//!
//! Same dual-idempotency shape as charges. A refund additionally
//! requires a charge that belongs to the same app and was settled at the
//! processor (`psp_charge_id` present); a cross-tenant charge reference
//! is indistinguishable from a missing one.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{CreateRefundRequest, Refund};
use crate::psp::PspClient;
use crate::repository::refund_repository::NewRefund;
use crate::repository::{ChargeRepository, RefundRepository};
use crate::{Error, Result};

#[derive(Clone)]
pub struct RefundService {
    refunds: Arc<dyn RefundRepository>,
    charges: Arc<dyn ChargeRepository>,
    psp: Arc<dyn PspClient>,
}

impl RefundService {
    pub fn new(
        refunds: Arc<dyn RefundRepository>,
        charges: Arc<dyn ChargeRepository>,
        psp: Arc<dyn PspClient>,
    ) -> Self {
        Self {
            refunds,
            charges,
            psp,
        }
    }

    pub async fn create(&self, app: &AppConfig, request: &CreateRefundRequest) -> Result<Refund> {
        if request.amount_cents <= 0 {
            return Err(Error::validation("amount_cents must be a positive integer"));
        }
        if request.reference_id.trim().is_empty() {
            return Err(Error::validation("reference_id is required"));
        }

        let charge = self
            .charges
            .find_by_id(&app.app_id, request.charge_id)
            .await?
            .ok_or_else(|| Error::not_found("Charge not found"))?;

        let psp_charge_id = charge
            .psp_charge_id
            .clone()
            .ok_or_else(|| Error::conflict("charge was never settled at the processor"))?;

        if request.amount_cents > charge.amount_cents {
            return Err(Error::validation("refund exceeds the charged amount"));
        }

        if let Some(existing) = self
            .refunds
            .find_by_reference(&app.app_id, &request.reference_id)
            .await?
        {
            info!(
                app_id = %app.app_id,
                reference_id = %request.reference_id,
                refund_id = %existing.id,
                "returning existing refund for reference_id"
            );
            return Ok(existing);
        }

        let new_refund = NewRefund {
            customer_id: charge.customer_id,
            charge_id: charge.id,
            amount_cents: request.amount_cents,
            currency: charge.currency.clone(),
            reason: request.reason.clone(),
            reference_id: request.reference_id.clone(),
            metadata: request.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
        };

        let pending = match self.refunds.insert_pending(&app.app_id, &new_refund).await {
            Ok(pending) => pending,
            Err(e) if e.is_unique_violation() => {
                return self
                    .refunds
                    .find_by_reference(&app.app_id, &request.reference_id)
                    .await?
                    .ok_or_else(|| Error::internal("refund vanished after reference race"));
            }
            Err(e) => return Err(e),
        };

        match self
            .psp
            .create_refund(
                app,
                &psp_charge_id,
                pending.amount_cents,
                pending.reason.as_deref(),
            )
            .await
        {
            Ok(psp_refund) => {
                self.refunds
                    .mark_succeeded(&app.app_id, pending.id, &psp_refund.id)
                    .await
            }
            Err(Error::PaymentProcessor { code, message }) => {
                self.refunds
                    .mark_failed(&app.app_id, pending.id, &code, &message)
                    .await?;
                Err(Error::PaymentProcessor { code, message })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, app_id: &str, id: Uuid) -> Result<Refund> {
        self.refunds
            .find_by_id(app_id, id)
            .await?
            .ok_or_else(|| Error::not_found("Refund not found"))
    }

    pub async fn list(&self, app_id: &str, charge_id: Option<Uuid>) -> Result<Vec<Refund>> {
        self.refunds.list(app_id, charge_id).await
    }
}
