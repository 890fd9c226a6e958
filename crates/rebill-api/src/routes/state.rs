//! Composed per-customer state snapshot

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use rebill_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Tenant;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub external_customer_id: Option<String>,
}

pub async fn get_state(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(query): Query<StateQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let external_customer_id = query
        .external_customer_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError(Error::validation("external_customer_id is required")))?;

    let snapshot = state
        .state_service
        .snapshot(&tenant.0, &external_customer_id)
        .await?;

    Ok(Json(serde_json::to_value(&snapshot).map_err(Error::from)?))
}
