//! Business services
//!
//! Services own the orchestration between the store and the PSP adapter.
//! Collaborators are injected as trait objects so the logic is testable
//! against in-memory repositories and a scripted PSP.
//!
//! The load-bearing ordering rule: for idempotency-critical operations a
//! local `pending` row is committed before the PSP is called, so a
//! mid-flight crash leaves detectable evidence instead of a silent loss.

pub mod billing_service;
pub mod charge_service;
pub mod customer_service;
pub mod payment_method_service;
pub mod refund_service;
pub mod state_service;
pub mod subscription_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use billing_service::BillingService;
pub use charge_service::ChargeService;
pub use customer_service::CustomerService;
pub use payment_method_service::PaymentMethodService;
pub use refund_service::RefundService;
pub use state_service::{StateService, StateSnapshot};
pub use subscription_service::SubscriptionService;
