//! Server bootstrap and router assembly
//!
//! The router is built through `ApiPipeline`, which fixes the middleware
//! order at construction time: tenant resolver, then PCI reject, then
//! idempotency on the endpoints that require it, with the error mapper
//! terminal by virtue of every handler returning `ApiResult`. Webhook
//! routes get the tenant resolver but never the PCI scan or a JSON
//! decoder; health routes get neither.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use rebill_core::psp::TilledClient;
use rebill_core::repository::{
    PgChargeRepository, PgCouponRepository, PgCustomerRepository, PgDisputeRepository,
    PgIdempotencyRepository, PgPaymentMethodRepository, PgRefundRepository,
    PgSubscriptionRepository, PgTaxRateRepository, PgWebhookRepository,
};
use rebill_core::{
    create_pool, BillingService, ChargeService, Config, CustomerService, Database, Dispatcher,
    Error, IdempotencyEngine, PaymentMethodService, RefundService, Result, StateService,
    SubscriptionService, WebhookPipeline,
};

use crate::error::set_production_mode;
use crate::middleware::{idempotency_middleware, pci_reject_middleware, tenant_middleware};
use crate::routes;
use crate::state::AppState;

pub async fn run(config: Config) -> Result<()> {
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| Error::Config(format!("Invalid host: {}", e)))?,
        config.server.port,
    ));

    set_production_mode(config.production);

    let app_state = create_app_state(config).await?;
    let app = ApiPipeline::new(app_state).build();

    info!("rebill API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::internal(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::internal(e.to_string()))?;

    Ok(())
}

/// Build application state from config: pool, repositories, PSP client,
/// services.
pub async fn create_app_state(config: Config) -> Result<AppState> {
    let pool = create_pool(&config.database.url, config.database.pool_size).await?;
    Ok(state_from_pool(pool, config))
}

/// Assemble services over an existing pool.
pub fn state_from_pool(pool: sqlx::PgPool, config: Config) -> AppState {
    let db = Database::new(pool.clone());

    let customers = Arc::new(PgCustomerRepository::new(pool.clone()));
    let payment_methods = Arc::new(PgPaymentMethodRepository::new(pool.clone()));
    let subscriptions = Arc::new(PgSubscriptionRepository::new(pool.clone()));
    let charges = Arc::new(PgChargeRepository::new(pool.clone()));
    let refunds = Arc::new(PgRefundRepository::new(pool.clone()));
    let disputes = Arc::new(PgDisputeRepository::new(pool.clone()));
    let coupons = Arc::new(PgCouponRepository::new(pool.clone()));
    let tax_rates = Arc::new(PgTaxRateRepository::new(pool.clone()));
    let webhooks = Arc::new(PgWebhookRepository::new(pool.clone()));
    let idempotency_records = Arc::new(PgIdempotencyRepository::new(pool));

    let psp = Arc::new(TilledClient::new(&config.psp));

    let customer_service =
        CustomerService::new(customers.clone(), payment_methods.clone(), psp.clone());
    let payment_method_service = PaymentMethodService::new(
        payment_methods.clone(),
        customers.clone(),
        customer_service.clone(),
        psp.clone(),
    );
    let subscription_service =
        SubscriptionService::new(subscriptions.clone(), customers.clone(), psp.clone());
    let charge_service = ChargeService::new(charges.clone(), customers.clone(), psp.clone());
    let refund_service = RefundService::new(refunds.clone(), charges.clone(), psp.clone());
    let billing_service = BillingService::new(
        coupons.clone(),
        tax_rates.clone(),
        customers.clone(),
        subscriptions.clone(),
    );
    let state_service = StateService::new(
        customers.clone(),
        subscriptions.clone(),
        payment_methods.clone(),
    );

    let idempotency = IdempotencyEngine::new(idempotency_records, config.idempotency.ttl_days);

    let dispatcher = Arc::new(Dispatcher::new(
        customers,
        payment_methods,
        subscriptions,
        charges,
        refunds,
        disputes.clone(),
    ));
    let webhook_pipeline = WebhookPipeline::new(
        webhooks.clone(),
        dispatcher,
        config.webhook.timestamp_tolerance_secs,
    );

    AppState {
        config: Arc::new(config),
        db,
        customer_service,
        payment_method_service,
        subscription_service,
        charge_service,
        refund_service,
        billing_service,
        state_service,
        idempotency,
        webhook_pipeline,
        webhook_repository: webhooks,
        coupon_repository: coupons,
        tax_rate_repository: tax_rates,
        dispute_repository: disputes,
    }
}

/// Router builder with the middleware chain fixed at construction time.
pub struct ApiPipeline {
    state: AppState,
}

impl ApiPipeline {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn build(self) -> Router {
        let state = self.state;

        // Endpoints that require an Idempotency-Key get the extra layer,
        // inside tenant + PCI.
        let idempotent_routes = Router::new()
            .route("/charges/one-time", post(routes::charge::create_one_time_charge))
            .route("/refunds", post(routes::refund::create_refund))
            .route_layer(from_fn_with_state(state.clone(), idempotency_middleware));

        let scoped_routes = Router::new()
            .route("/state", get(routes::state::get_state))
            .route(
                "/customers",
                get(routes::customer::lookup_customer).post(routes::customer::create_customer),
            )
            .route(
                "/customers/:id",
                get(routes::customer::get_customer).put(routes::customer::update_customer),
            )
            .route(
                "/customers/:id/default-payment-method",
                put(routes::customer::set_default_payment_method),
            )
            .route(
                "/payment-methods",
                get(routes::payment_method::list_payment_methods)
                    .post(routes::payment_method::add_payment_method),
            )
            .route(
                "/payment-methods/:psp_id",
                delete(routes::payment_method::delete_payment_method),
            )
            .route(
                "/payment-methods/:psp_id/default",
                put(routes::payment_method::set_default),
            )
            .route(
                "/subscriptions",
                get(routes::subscription::list_subscriptions)
                    .post(routes::subscription::create_subscription),
            )
            .route("/subscriptions/change-cycle", post(routes::subscription::change_cycle))
            .route(
                "/subscriptions/:id",
                get(routes::subscription::get_subscription)
                    .put(routes::subscription::update_subscription)
                    .delete(routes::subscription::cancel_subscription),
            )
            .route(
                "/subscriptions/:id/proration/apply",
                post(routes::subscription::apply_proration),
            )
            .route(
                "/subscriptions/:id/proration/cancellation-refund",
                post(routes::subscription::cancellation_refund),
            )
            .route("/charges", get(routes::charge::list_charges))
            .route("/charges/:id", get(routes::charge::get_charge))
            .route("/refunds", get(routes::refund::list_refunds))
            .route("/refunds/:id", get(routes::refund::get_refund))
            .route("/proration/calculate", post(routes::proration::calculate_proration))
            .route("/discounts/preview", post(routes::proration::preview_discounts))
            .route("/billing/quote", post(routes::proration::quote))
            .route("/billing/finalize", post(routes::proration::finalize_quote))
            .route(
                "/coupons",
                get(routes::coupon::list_coupons).post(routes::coupon::create_coupon),
            )
            .route(
                "/coupons/:id",
                get(routes::coupon::get_coupon).put(routes::coupon::update_coupon),
            )
            .route(
                "/tax-rates",
                get(routes::tax_rate::list_tax_rates).post(routes::tax_rate::create_tax_rate),
            )
            .route("/disputes", get(routes::dispute::list_disputes))
            .route("/disputes/:id", get(routes::dispute::get_dispute))
            .merge(idempotent_routes)
            // PCI reject inside, tenant resolver outside: requests see the
            // resolver first.
            .route_layer(axum::middleware::from_fn(pci_reject_middleware))
            .route_layer(from_fn_with_state(state.clone(), tenant_middleware));

        // Webhooks: raw body, tenant from the path, no PCI scan, no JSON
        // decoding before signature verification.
        let webhook_routes = Router::new()
            .route("/webhooks/:app_id", post(routes::webhook::receive_webhook))
            .route("/webhooks/:app_id/events", get(routes::webhook::list_events))
            .route_layer(from_fn_with_state(state.clone(), tenant_middleware));

        Router::new()
            .merge(routes::health::router())
            .merge(scoped_routes)
            .merge(webhook_routes)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
