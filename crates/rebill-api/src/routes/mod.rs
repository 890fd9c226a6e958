//! API route handlers

pub mod charge;
pub mod coupon;
pub mod customer;
pub mod dispute;
pub mod health;
pub mod payment_method;
pub mod proration;
pub mod refund;
pub mod state;
pub mod subscription;
pub mod tax_rate;
pub mod webhook;

use rebill_core::ValidationErrors;

use crate::error::ApiError;

/// Run derive-based validation and convert failures into the
/// machine-readable `details` shape.
pub fn validate_request<T: validator::Validate>(request: &T) -> Result<(), ApiError> {
    match request.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let mut details = ValidationErrors::new();
            for (field, failures) in errors.field_errors() {
                for failure in failures {
                    let message = failure
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field));
                    details.add(field.to_string(), message);
                }
            }
            Err(ApiError(details.into_error()))
        }
    }
}
