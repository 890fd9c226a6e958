//! Webhook ingestion route
//!
//! The handler works on the raw bytes buffered by the tenant resolver;
//! no JSON extractor runs before the signature is verified against the
//! exact payload the PSP signed.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::middleware::{BufferedBody, Tenant};
use crate::state::AppState;

/// Signature header set by the PSP
pub const SIGNATURE_HEADER: &str = "tilled-signature";

pub async fn receive_webhook(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Extension(body): Extension<BufferedBody>,
    Path(_app_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = state
        .webhook_pipeline
        .ingest(&tenant.0, &body.0, signature, Utc::now())
        .await?;

    let body = if ack.duplicate {
        serde_json::json!({ "received": true, "duplicate": true })
    } else {
        serde_json::json!({ "received": true })
    };
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(_app_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let events = state
        .webhook_repository
        .list(&tenant.0.app_id, limit)
        .await?;
    Ok(Json(serde_json::json!({ "events": events })))
}
