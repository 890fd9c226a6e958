//! Payment method routes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use rebill_core::models::AddPaymentMethodRequest;
use rebill_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Tenant;
use crate::routes::validate_request;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<Uuid>,
}

pub async fn list_payment_methods(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let customer_id = query
        .customer_id
        .ok_or_else(|| ApiError(Error::validation("customer_id is required")))?;

    let methods = state
        .payment_method_service
        .list(&tenant.0.app_id, customer_id)
        .await?;
    Ok(Json(serde_json::json!({ "payment_methods": methods })))
}

pub async fn add_payment_method(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<AddPaymentMethodRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    validate_request(&request)?;

    let method = state.payment_method_service.add(&tenant.0, &request).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&method).map_err(Error::from)?),
    ))
}

pub async fn delete_payment_method(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(psp_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.payment_method_service.delete(&tenant.0, &psp_id).await?;
    Ok(Json(serde_json::json!({
        "deleted": true,
        "id": deleted.id,
        "psp_payment_method_id": deleted.psp_payment_method_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SetDefaultBody {
    pub customer_id: Uuid,
}

pub async fn set_default(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(psp_id): Path<String>,
    Json(body): Json<SetDefaultBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let method = state
        .customer_service
        .set_default_payment_method(
            &tenant.0,
            body.customer_id,
            &rebill_core::models::SetDefaultPaymentMethodRequest {
                payment_method_token: psp_id,
            },
        )
        .await?;
    Ok(Json(serde_json::to_value(&method).map_err(Error::from)?))
}
