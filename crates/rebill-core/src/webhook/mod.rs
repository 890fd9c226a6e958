//! Webhook ingestion pipeline
//!
//! Envelope-first: the event is recorded (unique on `event_id`) before
//! signature verification or any handler runs, so duplicate deliveries
//! are detected even across handler failures, and a forged replay of an
//! already-seen event cannot reach a handler twice.
//!
//! Processing order is contractual:
//! 1. envelope insert (duplicate -> ack with `duplicate=true`, stop)
//! 2. signature verify (timestamp tolerance before HMAC)
//! 3. dispatch by event type (idempotent upserts)
//! 4. envelope status -> processed

pub mod dispatch;
pub mod signature;

pub use dispatch::Dispatcher;
pub use signature::{parse_signature_header, sign, verify_signature};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::config::AppConfig;
use crate::models::WebhookStatus;
use crate::repository::{EnvelopeInsert, WebhookRepository};
use crate::{Error, Result};

/// Response to the webhook sender
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

/// Minimal event shape required to record an envelope
#[derive(Debug, Deserialize)]
struct EventPayload {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: EventData,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    #[serde(default)]
    object: serde_json::Value,
}

/// Handler seam; the production implementation is [`Dispatcher`].
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        app_id: &str,
        event_type: &str,
        object: &serde_json::Value,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct WebhookPipeline {
    webhooks: Arc<dyn WebhookRepository>,
    dispatcher: Arc<dyn EventDispatcher>,
    tolerance_secs: i64,
}

impl WebhookPipeline {
    pub fn new(
        webhooks: Arc<dyn WebhookRepository>,
        dispatcher: Arc<dyn EventDispatcher>,
        tolerance_secs: i64,
    ) -> Self {
        Self {
            webhooks,
            dispatcher,
            tolerance_secs,
        }
    }

    /// Ingest a raw delivery. The signature covers the raw bytes, so the
    /// body must reach this function undecoded.
    pub async fn ingest(
        &self,
        app: &AppConfig,
        raw_body: &[u8],
        signature_header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck> {
        let event: EventPayload = serde_json::from_slice(raw_body)
            .map_err(|_| Error::validation("webhook body is not a valid event"))?;
        if event.id.is_empty() {
            return Err(Error::validation("webhook event is missing an id"));
        }

        let payload: serde_json::Value = serde_json::from_slice(raw_body)?;
        match self
            .webhooks
            .insert_envelope(&app.app_id, &event.id, &event.event_type, &payload)
            .await?
        {
            EnvelopeInsert::Duplicate(_) => {
                return Ok(WebhookAck {
                    received: true,
                    duplicate: true,
                });
            }
            EnvelopeInsert::Inserted(_) => {}
        }

        let header = signature_header
            .ok_or_else(|| Error::unauthorized("missing signature header"));
        let verified = header.and_then(|h| {
            signature::verify_signature(
                &app.psp_webhook_secret,
                raw_body,
                h,
                self.tolerance_secs,
                now.timestamp(),
            )
        });
        if let Err(e) = verified {
            // The event stays recorded, so a later replay of the same
            // delivery is a duplicate even though verification failed.
            self.webhooks
                .set_status(&event.id, WebhookStatus::Failed, Some("invalid signature"))
                .await?;
            return Err(e);
        }

        self.webhooks
            .set_status(&event.id, WebhookStatus::Processing, None)
            .await?;

        match self
            .dispatcher
            .dispatch(&app.app_id, &event.event_type, &event.data.object)
            .await
        {
            Ok(()) => {
                self.webhooks
                    .set_status(&event.id, WebhookStatus::Processed, None)
                    .await?;
                Ok(WebhookAck {
                    received: true,
                    duplicate: false,
                })
            }
            Err(e) => {
                warn!(
                    app_id = %app.app_id,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "webhook dispatch failed"
                );
                self.webhooks
                    .set_status(&event.id, WebhookStatus::Failed, Some(&e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    /// Operator replay: reset a failed envelope and re-dispatch its
    /// stored payload. Signature verification is skipped; the event was
    /// already authenticated (or deliberately re-queued by an operator).
    pub async fn replay(&self, app_id: &str, event_id: &str) -> Result<WebhookAck> {
        let envelope = self.webhooks.reset_for_replay(app_id, event_id).await?;

        let object = envelope
            .payload
            .get("data")
            .and_then(|d| d.get("object"))
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        self.webhooks
            .set_status(event_id, WebhookStatus::Processing, None)
            .await?;

        match self
            .dispatcher
            .dispatch(app_id, &envelope.event_type, &object)
            .await
        {
            Ok(()) => {
                self.webhooks
                    .set_status(event_id, WebhookStatus::Processed, None)
                    .await?;
                Ok(WebhookAck {
                    received: true,
                    duplicate: false,
                })
            }
            Err(e) => {
                self.webhooks
                    .set_status(event_id, WebhookStatus::Failed, Some(&e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }
}
