//! Subscription routes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use rebill_core::models::{CancelSubscriptionRequest, CreateSubscriptionRequest};
use rebill_core::Error;

use crate::error::ApiResult;
use crate::middleware::Tenant;
use crate::routes::validate_request;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<Uuid>,
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let subscriptions = state
        .subscription_service
        .list(&tenant.0.app_id, query.customer_id)
        .await?;
    Ok(Json(serde_json::json!({ "subscriptions": subscriptions })))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    validate_request(&request)?;

    let subscription = state.subscription_service.create(&tenant.0, &request).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&subscription).map_err(Error::from)?),
    ))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let subscription = state.subscription_service.get(&tenant.0.app_id, id).await?;
    Ok(Json(serde_json::to_value(&subscription).map_err(Error::from)?))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let subscription = state.subscription_service.update(&tenant.0, id, &body).await?;
    Ok(Json(serde_json::to_value(&subscription).map_err(Error::from)?))
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    #[serde(default)]
    pub at_period_end: bool,
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Query(query): Query<CancelQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let subscription = state
        .subscription_service
        .cancel(
            &tenant.0,
            id,
            &CancelSubscriptionRequest {
                at_period_end: query.at_period_end,
            },
        )
        .await?;
    Ok(Json(serde_json::to_value(&subscription).map_err(Error::from)?))
}

pub async fn change_cycle(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let subscription = state.subscription_service.change_cycle(&tenant.0, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&subscription).map_err(Error::from)?),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ApplyProrationBody {
    pub new_price_cents: i64,
    pub change_date: Option<DateTime<Utc>>,
    pub quantity: Option<i64>,
}

pub async fn apply_proration(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(body): Json<ApplyProrationBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = state
        .billing_service
        .apply_proration(&tenant.0, id, body.new_price_cents, body.change_date, body.quantity)
        .await?;
    Ok(Json(serde_json::to_value(&result).map_err(Error::from)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancellationRefundBody {
    pub cancel_date: Option<DateTime<Utc>>,
}

pub async fn cancellation_refund(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancellationRefundBody>>,
) -> ApiResult<Json<serde_json::Value>> {
    let cancel_date = body.and_then(|b| b.0.cancel_date);
    let result = state
        .billing_service
        .cancellation_refund(&tenant.0, id, cancel_date)
        .await?;
    Ok(Json(serde_json::json!({
        "refund_cents": result.credit_cents,
        "days_total": result.days_total,
        "days_remaining": result.days_remaining,
    })))
}
