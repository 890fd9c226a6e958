//! Tenant resolver
//!
//! Every scoped request must name its `app_id` explicitly (query, body,
//! or webhook path); there is no implicit tenant. When the upstream auth
//! layer supplies a verified identity header, a mismatch with the
//! requested tenant is a hard 403. The resolved `AppConfig` and the
//! buffered body travel in request extensions for downstream stages.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use rebill_core::config::AppConfig;
use rebill_core::Error;

use crate::error::ApiError;
use crate::state::AppState;

/// Requests larger than this are rejected outright.
const BODY_LIMIT: usize = 1024 * 1024;

/// Header set by the upstream tenant-authentication layer
pub const AUTHENTICATED_APP_HEADER: &str = "x-authenticated-app-id";

/// Resolved tenant, available to every downstream handler
#[derive(Clone)]
pub struct Tenant(pub AppConfig);

/// Raw request bytes, buffered once for the PCI scan and idempotency hash
#[derive(Clone, Default)]
pub struct BufferedBody(pub Bytes);

pub async fn tenant_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    let bytes = to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|_| ApiError(Error::validation("request body too large")))?;

    let from_query = query_param(parts.uri.query(), "app_id");
    let from_path = webhook_path_app(parts.uri.path());
    let from_body = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|v| v.get("app_id").and_then(|a| a.as_str()).map(String::from));

    let app_id = from_query
        .or(from_path)
        .or(from_body)
        .ok_or_else(|| ApiError(Error::validation("app_id is required")))?;

    if let Some(authenticated) = parts
        .headers
        .get(AUTHENTICATED_APP_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if !authenticated.eq_ignore_ascii_case(&app_id) {
            return Err(ApiError(Error::forbidden(
                "authenticated application does not match requested app_id",
            )));
        }
    }

    let app = state.app(&app_id)?;

    parts.extensions.insert(Tenant(app));
    parts.extensions.insert(BufferedBody(bytes.clone()));

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

fn webhook_path_app(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/webhooks/")?;
    let app = rest.split('/').next()?;
    (!app.is_empty()).then(|| app.to_string())
}
