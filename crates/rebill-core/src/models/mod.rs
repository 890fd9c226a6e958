//! Domain models
//!
//! Row structs map 1:1 onto the schema; every tenant-owned row carries
//! `app_id`. Monetary amounts are signed integer cents.

pub mod charge;
pub mod coupon;
pub mod customer;
pub mod dispute;
pub mod idempotency;
pub mod payment_method;
pub mod refund;
pub mod subscription;
pub mod tax;
pub mod webhook;

pub use charge::{Charge, ChargeStatus, CreateChargeRequest};
pub use coupon::{Coupon, CouponType, CreateCouponRequest, UpdateCouponRequest, VolumeTier};
pub use customer::{
    CreateCustomerRequest, Customer, CustomerStatus, SetDefaultPaymentMethodRequest,
    UpdateCustomerRequest,
};
pub use dispute::Dispute;
pub use idempotency::IdempotencyRecord;
pub use payment_method::{AddPaymentMethodRequest, PaymentMethod, PaymentMethodType};
pub use refund::{CreateRefundRequest, Refund, RefundStatus};
pub use subscription::{
    CancelSubscriptionRequest, ChangeCycleRequest, CreateSubscriptionRequest, IntervalUnit,
    Subscription, SubscriptionStatus, UpdateSubscriptionRequest,
};
pub use tax::{CreateTaxRateRequest, TaxRate};
pub use webhook::{WebhookEnvelope, WebhookStatus};
