//! Refund routes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use rebill_core::models::{CreateRefundRequest, RefundStatus};
use rebill_core::Error;

use crate::error::ApiResult;
use crate::middleware::{sanitize, Tenant};
use crate::routes::validate_request;
use crate::state::AppState;

pub async fn create_refund(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(mut request): Json<CreateRefundRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if let Some(reason) = &request.reason {
        request.reason = Some(sanitize(reason));
    }
    validate_request(&request)?;

    let refund = state.refund_service.create(&tenant.0, &request).await?;
    let status = if refund.status == RefundStatus::Succeeded {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(serde_json::to_value(&refund).map_err(Error::from)?)))
}

pub async fn get_refund(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let refund = state.refund_service.get(&tenant.0.app_id, id).await?;
    Ok(Json(serde_json::to_value(&refund).map_err(Error::from)?))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub charge_id: Option<Uuid>,
}

pub async fn list_refunds(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let refunds = state
        .refund_service
        .list(&tenant.0.app_id, query.charge_id)
        .await?;
    Ok(Json(serde_json::json!({ "refunds": refunds })))
}
