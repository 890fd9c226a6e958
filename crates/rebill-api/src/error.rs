//! Central error mapper
//!
//! The terminal stage of every request: typed core errors become HTTP
//! responses here and nowhere else. In production mode, 500 bodies carry
//! no internal detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::OnceCell;
use serde_json::json;

use rebill_core::Error;

static PRODUCTION: OnceCell<bool> = OnceCell::new();

/// Set once at startup from config; defaults to development behavior.
pub fn set_production_mode(production: bool) {
    let _ = PRODUCTION.set(production);
}

fn production() -> bool {
    *PRODUCTION.get().unwrap_or(&false)
}

/// Response-side wrapper for the core error type
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self.0 {
            Error::PaymentProcessor { code, message } => json!({
                "error": "payment processor error",
                "code": code,
                "message": message,
            }),
            Error::Validation(msg) => {
                // Field-level errors are serialized as a details array.
                match serde_json::from_str::<serde_json::Value>(msg) {
                    Ok(details) if details.is_array() => json!({
                        "error": "validation failed",
                        "details": details,
                    }),
                    _ => json!({ "error": msg }),
                }
            }
            Error::Backpressure => json!({ "error": "too many concurrent payment operations" }),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                if production() {
                    json!({ "error": "internal server error" })
                } else {
                    tracing::error!(error = %self.0, "internal error");
                    json!({ "error": self.0.to_string() })
                }
            }
            other => json!({ "error": other.to_string() }),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, category = self.0.category(), "request failed");
        }

        (status, Json(body)).into_response()
    }
}

/// Handler result alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;
