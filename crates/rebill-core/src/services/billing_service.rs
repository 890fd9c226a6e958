//! Billing Service
//!
//! Wires the pure calculators to stored reference data. Calculation and
//! persistence are separate steps: previews and quotes never write, and
//! audit rows are appended only after a successful finalization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::{
    apply_discounts, calculate_tax, prorate, DiscountContext, DiscountOutcome, ProrationInput,
    ProrationKind, ProrationResult, TaxOutcome,
};
use crate::config::AppConfig;
use crate::models::Customer;
use crate::repository::{
    CouponRepository, CustomerRepository, SubscriptionRepository, TaxRateRepository,
};
use crate::{Error, Result};

/// Inputs for a discount/tax quote
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub external_customer_id: String,
    pub subtotal_cents: i64,
    #[serde(default)]
    pub coupon_codes: Vec<String>,
    #[serde(default)]
    pub product_categories: Vec<String>,
    #[serde(default)]
    pub total_quantity: i64,
    pub jurisdiction_code: Option<String>,
    pub invoice_id: Option<String>,
}

/// Full quote: discount stack then tax on the discounted subtotal
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub discounts: DiscountOutcome,
    pub tax: TaxOutcome,
    pub total_cents: i64,
}

#[derive(Clone)]
pub struct BillingService {
    coupons: Arc<dyn CouponRepository>,
    tax_rates: Arc<dyn TaxRateRepository>,
    customers: Arc<dyn CustomerRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl BillingService {
    pub fn new(
        coupons: Arc<dyn CouponRepository>,
        tax_rates: Arc<dyn TaxRateRepository>,
        customers: Arc<dyn CustomerRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
    ) -> Self {
        Self {
            coupons,
            tax_rates,
            customers,
            subscriptions,
        }
    }

    /// Quote an invoice: proration is assumed already folded into the
    /// subtotal, discounts apply next, tax applies to what remains.
    pub async fn quote(&self, app: &AppConfig, request: &QuoteRequest) -> Result<Quote> {
        if request.subtotal_cents < 0 {
            return Err(Error::validation("subtotal_cents must be non-negative"));
        }

        let customer = self.resolve_customer(app, &request.external_customer_id).await?;
        let now = Utc::now();

        let discounts = self
            .run_discounts(app, &customer, request, now)
            .await?;

        let jurisdiction = crate::billing::tax::resolve_jurisdiction(
            request.jurisdiction_code.as_deref(),
            &customer,
        );
        let rates = match &jurisdiction {
            Some(code) => self.tax_rates.list_for_jurisdiction(&app.app_id, code).await?,
            None => Vec::new(),
        };
        let tax = calculate_tax(
            discounts.final_subtotal_cents,
            jurisdiction,
            &rates,
            &customer,
            now,
        );

        let total_cents = discounts.final_subtotal_cents + tax.total_tax_cents;
        Ok(Quote {
            discounts,
            tax,
            total_cents,
        })
    }

    /// Persist the audit trail for a finalized quote: one row per applied
    /// coupon, one tax row, and redemption counters.
    pub async fn finalize(
        &self,
        app: &AppConfig,
        quote: &Quote,
        invoice_id: Option<&str>,
        charge_id: Option<Uuid>,
    ) -> Result<()> {
        for applied in &quote.discounts.applied {
            self.coupons
                .record_application(
                    &app.app_id,
                    applied.coupon_id,
                    &applied.code,
                    invoice_id,
                    charge_id,
                    applied.basis_cents,
                    applied.discount_cents,
                )
                .await?;
            self.coupons
                .increment_redemptions(&app.app_id, applied.coupon_id)
                .await?;
        }

        if let Some(jurisdiction) = &quote.tax.jurisdiction_code {
            self.tax_rates
                .record_calculation(
                    &app.app_id,
                    invoice_id,
                    charge_id,
                    jurisdiction,
                    quote.tax.taxable_cents,
                    quote.tax.total_tax_cents,
                    &serde_json::to_value(&quote.tax.lines)?,
                )
                .await?;
        }

        Ok(())
    }

    /// Preview the discount stack without touching tax or audit rows.
    pub async fn preview_discounts(
        &self,
        app: &AppConfig,
        request: &QuoteRequest,
    ) -> Result<DiscountOutcome> {
        let customer = self.resolve_customer(app, &request.external_customer_id).await?;
        self.run_discounts(app, &customer, request, Utc::now()).await
    }

    /// Prorate a plan change on a live subscription and append the audit
    /// event.
    pub async fn apply_proration(
        &self,
        app: &AppConfig,
        subscription_id: Uuid,
        new_price_cents: i64,
        change_date: Option<DateTime<Utc>>,
        quantity: Option<i64>,
    ) -> Result<ProrationResult> {
        let subscription = self
            .subscriptions
            .find_by_id(&app.app_id, subscription_id)
            .await?
            .ok_or_else(|| Error::not_found("Subscription not found"))?;

        let input = ProrationInput {
            period_start: subscription.current_period_start,
            period_end: subscription.current_period_end,
            change_date: change_date.unwrap_or_else(Utc::now),
            old_price_cents: subscription.price_cents,
            new_price_cents,
            quantity: quantity.unwrap_or(1),
        };
        let result = prorate(&input);

        self.subscriptions
            .record_proration_event(
                &app.app_id,
                subscription.id,
                proration_kind_str(result.kind),
                result.net_cents,
                &serde_json::json!({
                    "days_total": result.days_total,
                    "days_remaining": result.days_remaining,
                    "credit_cents": result.credit_cents,
                    "charge_cents": result.charge_cents,
                    "old_price_cents": input.old_price_cents,
                    "new_price_cents": input.new_price_cents,
                    "change_date": input.change_date,
                }),
            )
            .await?;

        Ok(result)
    }

    /// Credit for the unused remainder of a period when a subscription is
    /// canceled mid-cycle.
    pub async fn cancellation_refund(
        &self,
        app: &AppConfig,
        subscription_id: Uuid,
        cancel_date: Option<DateTime<Utc>>,
    ) -> Result<ProrationResult> {
        let subscription = self
            .subscriptions
            .find_by_id(&app.app_id, subscription_id)
            .await?
            .ok_or_else(|| Error::not_found("Subscription not found"))?;

        let input = ProrationInput {
            period_start: subscription.current_period_start,
            period_end: subscription.current_period_end,
            change_date: cancel_date.unwrap_or_else(Utc::now),
            old_price_cents: subscription.price_cents,
            new_price_cents: 0,
            quantity: 1,
        };
        let result = prorate(&input);

        self.subscriptions
            .record_proration_event(
                &app.app_id,
                subscription.id,
                "proration_credit",
                result.net_cents,
                &serde_json::json!({
                    "days_total": result.days_total,
                    "days_remaining": result.days_remaining,
                    "credit_cents": result.credit_cents,
                    "cancel_date": input.change_date,
                }),
            )
            .await?;

        Ok(result)
    }

    async fn run_discounts(
        &self,
        app: &AppConfig,
        customer: &Customer,
        request: &QuoteRequest,
        now: DateTime<Utc>,
    ) -> Result<DiscountOutcome> {
        let coupons = if request.coupon_codes.is_empty() {
            Vec::new()
        } else {
            self.coupons
                .find_by_codes(&app.app_id, &request.coupon_codes)
                .await?
        };

        let ctx = DiscountContext {
            customer_segment: customer.segment(),
            product_categories: request.product_categories.clone(),
            total_quantity: request.total_quantity,
        };

        Ok(apply_discounts(request.subtotal_cents, &coupons, &ctx, now))
    }

    async fn resolve_customer(&self, app: &AppConfig, external_id: &str) -> Result<Customer> {
        self.customers
            .find_by_external_id(&app.app_id, external_id)
            .await?
            .ok_or_else(|| Error::not_found("Customer not found"))
    }
}

fn proration_kind_str(kind: ProrationKind) -> &'static str {
    match kind {
        ProrationKind::ProrationCharge => "proration_charge",
        ProrationKind::ProrationCredit => "proration_credit",
    }
}
