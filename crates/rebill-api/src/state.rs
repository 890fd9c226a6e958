use std::sync::Arc;

use rebill_core::config::AppConfig;
use rebill_core::repository::{
    CouponRepository, DisputeRepository, TaxRateRepository, WebhookRepository,
};
use rebill_core::{
    BillingService, ChargeService, Config, CustomerService, Database, Error, IdempotencyEngine,
    PaymentMethodService, RefundService, Result, StateService, SubscriptionService,
    WebhookPipeline,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub customer_service: CustomerService,
    pub payment_method_service: PaymentMethodService,
    pub subscription_service: SubscriptionService,
    pub charge_service: ChargeService,
    pub refund_service: RefundService,
    pub billing_service: BillingService,
    pub state_service: StateService,
    pub idempotency: IdempotencyEngine,
    pub webhook_pipeline: WebhookPipeline,
    pub webhook_repository: Arc<dyn WebhookRepository>,
    pub coupon_repository: Arc<dyn CouponRepository>,
    pub tax_rate_repository: Arc<dyn TaxRateRepository>,
    pub dispute_repository: Arc<dyn DisputeRepository>,
}

impl AppState {
    /// Resolve a tenant application; unknown tenants are indistinguishable
    /// from missing resources.
    pub fn app(&self, app_id: &str) -> Result<AppConfig> {
        self.config
            .app(app_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Application not found"))
    }
}
