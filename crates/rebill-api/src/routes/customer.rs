//! Customer routes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use rebill_core::models::{
    CreateCustomerRequest, SetDefaultPaymentMethodRequest, UpdateCustomerRequest,
};
use rebill_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{sanitize, Tenant};
use crate::routes::validate_request;
use crate::state::AppState;

pub async fn create_customer(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(mut request): Json<CreateCustomerRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    request.name = sanitize(&request.name);
    request.email = request.email.trim().to_string();
    validate_request(&request)?;

    let customer = state.customer_service.create(&tenant.0, &request).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&customer).map_err(Error::from)?),
    ))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let customer = state.customer_service.get(&tenant.0.app_id, id).await?;
    Ok(Json(serde_json::to_value(&customer).map_err(Error::from)?))
}

#[derive(Debug, Deserialize)]
pub struct CustomerLookupQuery {
    pub external_customer_id: Option<String>,
}

pub async fn lookup_customer(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(query): Query<CustomerLookupQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let external_customer_id = query
        .external_customer_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError(Error::validation("external_customer_id is required")))?;

    let customer = state
        .customer_service
        .get_by_external_id(&tenant.0.app_id, &external_customer_id)
        .await?;
    Ok(Json(serde_json::to_value(&customer).map_err(Error::from)?))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(mut request): Json<UpdateCustomerRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(name) = &request.name {
        request.name = Some(sanitize(name));
    }
    if let Some(email) = &request.email {
        request.email = Some(email.trim().to_string());
    }
    validate_request(&request)?;

    let customer = state.customer_service.update(&tenant.0, id, &request).await?;
    Ok(Json(serde_json::to_value(&customer).map_err(Error::from)?))
}

pub async fn set_default_payment_method(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetDefaultPaymentMethodRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    validate_request(&request)?;

    let method = state
        .customer_service
        .set_default_payment_method(&tenant.0, id, &request)
        .await?;
    Ok(Json(serde_json::to_value(&method).map_err(Error::from)?))
}
