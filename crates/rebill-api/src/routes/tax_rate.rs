//! Tax rate routes (app-scoped reference data)

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};

use rebill_core::models::CreateTaxRateRequest;
use rebill_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Tenant;
use crate::routes::validate_request;
use crate::state::AppState;

pub async fn list_tax_rates(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
) -> ApiResult<Json<serde_json::Value>> {
    let rates = state.tax_rate_repository.list(&tenant.0.app_id).await?;
    Ok(Json(serde_json::json!({ "tax_rates": rates })))
}

pub async fn create_tax_rate(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<CreateTaxRateRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    validate_request(&request)?;
    if let Some(expiration) = request.expiration_date {
        if expiration <= request.effective_date {
            return Err(ApiError(Error::validation(
                "expiration_date must be after effective_date",
            )));
        }
    }

    let rate = state
        .tax_rate_repository
        .create(&tenant.0.app_id, &request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&rate).map_err(Error::from)?),
    ))
}
