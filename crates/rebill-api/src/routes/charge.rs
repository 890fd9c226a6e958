//! One-time charge routes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use rebill_core::models::{ChargeStatus, CreateChargeRequest};
use rebill_core::Error;

use crate::error::ApiResult;
use crate::middleware::{sanitize, Tenant};
use crate::routes::validate_request;
use crate::state::AppState;

pub async fn create_one_time_charge(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(mut request): Json<CreateChargeRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if let Some(note) = &request.note {
        request.note = Some(sanitize(note));
    }
    if let Some(reason) = &request.reason {
        request.reason = Some(sanitize(reason));
    }
    validate_request(&request)?;

    let charge = state.charge_service.create_one_time(&tenant.0, &request).await?;
    let status = if charge.status == ChargeStatus::Succeeded {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(serde_json::to_value(&charge).map_err(Error::from)?)))
}

pub async fn get_charge(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let charge = state.charge_service.get(&tenant.0.app_id, id).await?;
    Ok(Json(serde_json::to_value(&charge).map_err(Error::from)?))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<Uuid>,
}

pub async fn list_charges(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let charges = state
        .charge_service
        .list(&tenant.0.app_id, query.customer_id)
        .await?;
    Ok(Json(serde_json::json!({ "charges": charges })))
}
