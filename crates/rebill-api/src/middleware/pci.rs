//! PCI-sensitive-data rejection
//!
//! This service never sees a primary account number. Any write body
//! carrying one of the forbidden field names, in any casing and at any
//! nesting depth, is refused before validation or business logic, and
//! the attempt is logged with the source IP.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use rebill_core::Error;

use crate::error::ApiError;

use super::tenant::BufferedBody;

const FORBIDDEN_FIELDS: &[&str] = &[
    "card_number",
    "card_cvv",
    "cvv",
    "cvc",
    "account_number",
    "routing_number",
];

pub async fn pci_reject_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    if !matches!(request.method().as_str(), "POST" | "PUT" | "PATCH") {
        return Ok(next.run(request).await);
    }

    let body = request
        .extensions()
        .get::<BufferedBody>()
        .cloned()
        .unwrap_or_default();

    if let Some(field) = find_forbidden_field(&body.0) {
        let source_ip = client_ip(&request);
        warn!(
            field,
            source_ip = %source_ip,
            path = %request.uri().path(),
            "PCI violation: raw payment data rejected at ingress"
        );
        return Err(ApiError(Error::validation(
            "raw payment details are not accepted; collect payment data with the hosted tokenization fields",
        )));
    }

    Ok(next.run(request).await)
}

/// Locate a forbidden field name in the body. JSON bodies are walked by
/// key at every depth; anything else falls back to a substring scan.
fn find_forbidden_field(body: &[u8]) -> Option<&'static str> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => scan_keys(&value),
        Err(_) => {
            let lowered = String::from_utf8_lossy(body).to_lowercase();
            FORBIDDEN_FIELDS
                .iter()
                .find(|field| lowered.contains(**field))
                .copied()
        }
    }
}

fn scan_keys(value: &serde_json::Value) -> Option<&'static str> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, nested) in map {
                let lowered = key.to_lowercase();
                if let Some(hit) = FORBIDDEN_FIELDS.iter().find(|f| lowered == **f) {
                    return Some(hit);
                }
                if let Some(hit) = scan_keys(nested) {
                    return Some(hit);
                }
            }
            None
        }
        serde_json::Value::Array(items) => items.iter().find_map(scan_keys),
        _ => None,
    }
}

fn client_ip(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
