//! Request-level idempotency engine
//!
//! Persistent replay cache keyed by `(app_id, key)`. The request hash is
//! SHA-256 over `method || path || canonical-json(body)` where canonical
//! JSON sorts object keys recursively, so semantically identical bodies
//! hash the same regardless of key order.
//!
//! Concurrent requests with the same key race on the database unique
//! constraint; the loser re-reads and returns the winner's response.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::models::IdempotencyRecord;
use crate::repository::IdempotencyRepository;
use crate::{Error, Result};

/// Outcome of the pre-handler idempotency check
#[derive(Debug)]
pub enum IdempotencyCheck {
    /// No record; process the request and store the outcome
    Miss,
    /// Same key, same payload: return the cached response verbatim
    Replay { status_code: u16, body: serde_json::Value },
}

#[derive(Clone)]
pub struct IdempotencyEngine {
    repository: Arc<dyn IdempotencyRepository>,
    ttl: Duration,
}

impl IdempotencyEngine {
    pub fn new(repository: Arc<dyn IdempotencyRepository>, ttl_days: i64) -> Self {
        Self {
            repository,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Check the cache before any side effect.
    ///
    /// A cached entry with a different request hash is key reuse and
    /// fails with `IdempotencyConflict` (HTTP 409).
    pub async fn check(
        &self,
        app_id: &str,
        key: &str,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyCheck> {
        match self.repository.find(app_id, key, now).await? {
            Some(record) if record.request_hash == request_hash => Ok(IdempotencyCheck::Replay {
                status_code: record.status_code as u16,
                body: record.response_body,
            }),
            Some(_) => Err(Error::idempotency_conflict(
                "Idempotency-Key was already used with a different request payload",
            )),
            None => Ok(IdempotencyCheck::Miss),
        }
    }

    /// Record the outcome of a processed request.
    ///
    /// Losing the insert race means a concurrent request with the same key
    /// committed first; return its response so both callers observe one
    /// outcome.
    pub async fn store(
        &self,
        app_id: &str,
        key: &str,
        request_hash: &str,
        status_code: u16,
        body: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Option<(u16, serde_json::Value)>> {
        let record = IdempotencyRecord {
            app_id: app_id.to_string(),
            key: key.to_string(),
            request_hash: request_hash.to_string(),
            status_code: status_code as i32,
            response_body: body.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        match self.repository.insert(&record).await {
            Ok(()) => Ok(None),
            Err(e) if e.is_unique_violation() => {
                let winner = self
                    .repository
                    .find(app_id, key, now)
                    .await?
                    .ok_or_else(|| Error::internal("idempotency record vanished after race"))?;
                if winner.request_hash != request_hash {
                    return Err(Error::idempotency_conflict(
                        "Idempotency-Key was already used with a different request payload",
                    ));
                }
                Ok(Some((winner.status_code as u16, winner.response_body)))
            }
            Err(e) => Err(e),
        }
    }

    /// Purge expired records; meant for a periodic sweep.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.repository.delete_expired(now).await
    }
}

/// Hash a request for replay detection.
pub fn request_hash(method: &str, path: &str, body: &[u8]) -> String {
    let canonical = canonical_json(body);
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonicalize a JSON body: object keys sorted recursively, no
/// insignificant whitespace. Non-JSON bodies hash as raw bytes.
fn canonical_json(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => {
            let mut out = String::new();
            write_canonical(&value, &mut out);
            out
        }
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[test]
    fn test_key_order_does_not_change_hash() {
        let a = request_hash("POST", "/charges/one-time", br#"{"a":1,"b":{"x":2,"y":3}}"#);
        let b = request_hash("POST", "/charges/one-time", br#"{"b":{"y":3,"x":2},"a":1}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_body_changes_hash() {
        let a = request_hash("POST", "/charges/one-time", br#"{"amount_cents":3500}"#);
        let b = request_hash("POST", "/charges/one-time", br#"{"amount_cents":3600}"#);
        assert_ne!(a, b);
    }

    #[test]
    fn test_method_and_path_participate() {
        let body = br#"{"amount_cents":3500}"#;
        assert_ne!(
            request_hash("POST", "/charges/one-time", body),
            request_hash("POST", "/refunds", body)
        );
        assert_ne!(
            request_hash("POST", "/charges/one-time", body),
            request_hash("PUT", "/charges/one-time", body)
        );
    }

    #[test]
    fn test_whitespace_does_not_change_hash() {
        let a = request_hash("POST", "/x", br#"{"a": 1}"#);
        let b = request_hash("POST", "/x", br#"{"a":1}"#);
        assert_eq!(a, b);
    }

    /// In-memory repository mirroring the unique-constraint behavior.
    struct MemIdempotencyRepository {
        records: Mutex<HashMap<(String, String), IdempotencyRecord>>,
    }

    impl MemIdempotencyRepository {
        fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl IdempotencyRepository for MemIdempotencyRepository {
        async fn find(
            &self,
            app_id: &str,
            key: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<IdempotencyRecord>> {
            let records = self.records.lock().await;
            Ok(records
                .get(&(app_id.to_string(), key.to_string()))
                .filter(|r| r.expires_at > now)
                .cloned())
        }

        async fn insert(&self, record: &IdempotencyRecord) -> Result<()> {
            let mut records = self.records.lock().await;
            let key = (record.app_id.clone(), record.key.clone());
            if records.contains_key(&key) {
                return Err(Error::conflict("idempotency key already recorded"));
            }
            records.insert(key, record.clone());
            Ok(())
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
            let mut records = self.records.lock().await;
            let before = records.len();
            records.retain(|_, r| r.expires_at > now);
            Ok((before - records.len()) as u64)
        }
    }

    fn engine() -> IdempotencyEngine {
        IdempotencyEngine::new(Arc::new(MemIdempotencyRepository::new()), 30)
    }

    #[tokio::test]
    async fn test_miss_then_replay() {
        let engine = engine();
        let now = Utc::now();
        let hash = request_hash("POST", "/charges/one-time", br#"{"amount_cents":3500}"#);

        assert!(matches!(
            engine.check("acme", "K1", &hash, now).await.unwrap(),
            IdempotencyCheck::Miss
        ));

        let body = serde_json::json!({"id": "ch_1", "status": "succeeded"});
        let raced = engine
            .store("acme", "K1", &hash, 201, &body, now)
            .await
            .unwrap();
        assert!(raced.is_none());

        match engine.check("acme", "K1", &hash, now).await.unwrap() {
            IdempotencyCheck::Replay { status_code, body: cached } => {
                assert_eq!(status_code, 201);
                assert_eq!(cached, body);
            }
            other => panic!("expected replay, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_same_key_different_payload_conflicts() {
        let engine = engine();
        let now = Utc::now();
        let h1 = request_hash("POST", "/charges/one-time", br#"{"amount_cents":3500}"#);
        let h2 = request_hash("POST", "/charges/one-time", br#"{"amount_cents":9999}"#);

        engine
            .store("acme", "K1", &h1, 201, &serde_json::json!({}), now)
            .await
            .unwrap();

        let err = engine.check("acme", "K1", &h2, now).await.unwrap_err();
        assert!(matches!(err, Error::IdempotencyConflict(_)));
    }

    #[tokio::test]
    async fn test_keys_are_tenant_scoped() {
        let engine = engine();
        let now = Utc::now();
        let hash = request_hash("POST", "/charges/one-time", br#"{"amount_cents":3500}"#);

        engine
            .store("acme", "K1", &hash, 201, &serde_json::json!({}), now)
            .await
            .unwrap();

        assert!(matches!(
            engine.check("otherapp", "K1", &hash, now).await.unwrap(),
            IdempotencyCheck::Miss
        ));
    }

    #[tokio::test]
    async fn test_store_race_returns_winner() {
        let engine = engine();
        let now = Utc::now();
        let hash = request_hash("POST", "/refunds", br#"{"reference_id":"r1"}"#);
        let winner_body = serde_json::json!({"id": "re_1"});

        engine
            .store("acme", "K1", &hash, 201, &winner_body, now)
            .await
            .unwrap();

        // A concurrent loser tries to store its own result for the same key.
        let raced = engine
            .store("acme", "K1", &hash, 201, &serde_json::json!({"id": "re_2"}), now)
            .await
            .unwrap();
        let (status, body) = raced.expect("loser should see the winner's response");
        assert_eq!(status, 201);
        assert_eq!(body, winner_body);
    }

    #[tokio::test]
    async fn test_expired_record_is_a_miss() {
        let engine = engine();
        let now = Utc::now();
        let hash = request_hash("POST", "/x", b"{}");

        engine
            .store("acme", "K1", &hash, 200, &serde_json::json!({}), now)
            .await
            .unwrap();

        let later = now + Duration::days(31);
        assert!(matches!(
            engine.check("acme", "K1", &hash, later).await.unwrap(),
            IdempotencyCheck::Miss
        ));
    }
}
