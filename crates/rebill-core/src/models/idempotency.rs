use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Cached response for a replayed Idempotency-Key.
///
/// Keyed by `(app_id, key)`; `request_hash` detects key reuse with a
/// different payload.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdempotencyRecord {
    pub app_id: String,
    pub key: String,
    pub request_hash: String,
    pub status_code: i32,
    pub response_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
