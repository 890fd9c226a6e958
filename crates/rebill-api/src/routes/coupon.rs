//! Coupon routes (app-scoped reference data)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;

use rebill_core::models::{CreateCouponRequest, UpdateCouponRequest};
use rebill_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Tenant;
use crate::routes::validate_request;
use crate::state::AppState;

pub async fn list_coupons(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
) -> ApiResult<Json<serde_json::Value>> {
    let coupons = state.coupon_repository.list(&tenant.0.app_id).await?;
    Ok(Json(serde_json::json!({ "coupons": coupons })))
}

pub async fn create_coupon(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<CreateCouponRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    validate_request(&request)?;
    if request.value < 0 {
        return Err(ApiError(Error::validation("value must be non-negative")));
    }

    let coupon = state
        .coupon_repository
        .create(&tenant.0.app_id, &request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&coupon).map_err(Error::from)?),
    ))
}

pub async fn get_coupon(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let coupon = state
        .coupon_repository
        .find_by_id(&tenant.0.app_id, id)
        .await?
        .ok_or_else(|| ApiError(Error::not_found("Coupon not found")))?;
    Ok(Json(serde_json::to_value(&coupon).map_err(Error::from)?))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCouponRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    validate_request(&request)?;

    let coupon = state
        .coupon_repository
        .update(&tenant.0.app_id, id, &request)
        .await?;
    Ok(Json(serde_json::to_value(&coupon).map_err(Error::from)?))
}
