//! Repository module for database access
//!
//! Every query function takes `app_id` as its first parameter; tenant
//! scoping is structural, not a runtime convention. Postgres unique
//! violations (23505) are mapped to `Error::Conflict` so the call sites
//! that expect a race can recover by re-reading the winner's row.

pub mod charge_repository;
pub mod coupon_repository;
pub mod customer_repository;
pub mod dispute_repository;
pub mod idempotency_repository;
pub mod payment_method_repository;
pub mod refund_repository;
pub mod subscription_repository;
pub mod tax_rate_repository;
pub mod webhook_repository;

pub use charge_repository::{ChargeRepository, PgChargeRepository};
pub use coupon_repository::{CouponRepository, PgCouponRepository};
pub use customer_repository::{CustomerRepository, PgCustomerRepository};
pub use dispute_repository::{DisputeRepository, PgDisputeRepository};
pub use idempotency_repository::{IdempotencyRepository, PgIdempotencyRepository};
pub use payment_method_repository::{PaymentMethodRepository, PgPaymentMethodRepository};
pub use refund_repository::{PgRefundRepository, RefundRepository};
pub use subscription_repository::{PgSubscriptionRepository, SubscriptionRepository};
pub use tax_rate_repository::{PgTaxRateRepository, TaxRateRepository};
pub use webhook_repository::{EnvelopeInsert, PgWebhookRepository, WebhookRepository};

use crate::Error;

/// Map a sqlx error, converting unique-constraint violations to
/// `Error::Conflict` with the given message.
pub(crate) fn map_unique(e: sqlx::Error, conflict_msg: &str) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            Error::Conflict(conflict_msg.to_string())
        }
        _ => Error::Database(e),
    }
}
