pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod psp;
pub mod repository;
pub mod services;
pub mod webhook;

// Re-export commonly used types
pub use config::{AppConfig, Config};
pub use db::{create_pool, Database};
pub use db::migrate::Migrator;
pub use error::{Error, FieldError, Result, ValidationErrors};
pub use idempotency::{request_hash, IdempotencyCheck, IdempotencyEngine};
pub use psp::{PspClient, TilledClient};
pub use services::{
    BillingService, ChargeService, CustomerService, PaymentMethodService, RefundService,
    StateService, SubscriptionService,
};
pub use webhook::{Dispatcher, WebhookPipeline};

/// Current version of rebill
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::validation("Test validation error");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }
}
