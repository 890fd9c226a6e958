//! Financial calculation routes
//!
//! `/proration/calculate` and `/discounts/preview` are side-effect free;
//! `/billing/quote` reads reference data but persists nothing.

use axum::extract::State;
use axum::{Extension, Json};

use rebill_core::billing::{prorate, ProrationInput};
use rebill_core::services::billing_service::QuoteRequest;
use rebill_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Tenant;
use crate::state::AppState;

pub async fn calculate_proration(
    Extension(_tenant): Extension<Tenant>,
    Json(input): Json<ProrationInput>,
) -> ApiResult<Json<serde_json::Value>> {
    if input.old_price_cents < 0 || input.new_price_cents < 0 {
        return Err(ApiError(Error::validation("prices must be non-negative")));
    }

    let result = prorate(&input);
    Ok(Json(serde_json::to_value(&result).map_err(Error::from)?))
}

pub async fn preview_discounts(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<QuoteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state
        .billing_service
        .preview_discounts(&tenant.0, &request)
        .await?;
    Ok(Json(serde_json::to_value(&outcome).map_err(Error::from)?))
}

pub async fn quote(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<QuoteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let quote = state.billing_service.quote(&tenant.0, &request).await?;
    Ok(Json(serde_json::to_value(&quote).map_err(Error::from)?))
}

/// Quote and persist the audit trail (discount applications, the tax
/// calculation, redemption counters) in one call.
pub async fn finalize_quote(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<QuoteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let quote = state.billing_service.quote(&tenant.0, &request).await?;
    state
        .billing_service
        .finalize(&tenant.0, &quote, request.invoice_id.as_deref(), None)
        .await?;
    Ok(Json(serde_json::to_value(&quote).map_err(Error::from)?))
}
