//! Dispute routes (read-only; disputes arrive via webhooks)

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use rebill_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Tenant;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<Uuid>,
}

pub async fn list_disputes(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let disputes = state
        .dispute_repository
        .list(&tenant.0.app_id, query.customer_id)
        .await?;
    Ok(Json(serde_json::json!({ "disputes": disputes })))
}

pub async fn get_dispute(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let dispute = state
        .dispute_repository
        .find_by_id(&tenant.0.app_id, id)
        .await?
        .ok_or_else(|| ApiError(Error::not_found("Dispute not found")))?;
    Ok(Json(serde_json::to_value(&dispute).map_err(Error::from)?))
}
