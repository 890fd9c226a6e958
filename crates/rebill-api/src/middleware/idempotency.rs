//! Request-level idempotency middleware
//!
//! Applied only to the endpoints that require an `Idempotency-Key`. The
//! check happens before the handler runs any side effect; the completed
//! response is cached afterwards. If two requests race on the same key,
//! the database unique constraint picks a winner and the loser returns
//! the winner's response.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use rebill_core::{request_hash, Error, IdempotencyCheck};

use crate::error::ApiError;
use crate::state::AppState;

use super::tenant::{BufferedBody, Tenant};

const RESPONSE_LIMIT: usize = 4 * 1024 * 1024;

pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tenant = request
        .extensions()
        .get::<Tenant>()
        .cloned()
        .ok_or_else(|| ApiError(Error::internal("tenant resolver did not run")))?;

    let key = request
        .headers()
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError(Error::validation("Idempotency-Key header is required")))?;

    let body = request
        .extensions()
        .get::<BufferedBody>()
        .cloned()
        .unwrap_or_default();

    let hash = request_hash(request.method().as_str(), request.uri().path(), &body.0);
    let app_id = tenant.0.app_id.clone();

    match state
        .idempotency
        .check(&app_id, &key, &hash, Utc::now())
        .await?
    {
        IdempotencyCheck::Replay { status_code, body } => {
            return Ok(cached_response(status_code, body));
        }
        IdempotencyCheck::Miss => {}
    }

    let response = next.run(request).await;

    let (parts, response_body) = response.into_parts();
    let bytes = to_bytes(response_body, RESPONSE_LIMIT)
        .await
        .map_err(|_| ApiError(Error::internal("response too large to cache")))?;

    // Completed business outcomes are cached, including 4xx and PSP
    // failures; transient 5xx internals are not.
    if parts.status != StatusCode::INTERNAL_SERVER_ERROR {
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            if let Some((status_code, winner_body)) = state
                .idempotency
                .store(
                    &app_id,
                    &key,
                    &hash,
                    parts.status.as_u16(),
                    &json,
                    Utc::now(),
                )
                .await?
            {
                return Ok(cached_response(status_code, winner_body));
            }
        }
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

fn cached_response(status_code: u16, body: serde_json::Value) -> Response {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::OK);
    (status, Json(body)).into_response()
}
