//! Verification and application of payment-provider webhooks.
//!
//! The signature is an HMAC-SHA256 over the exact request bytes, hex encoded
//! in `x-webhook-signature` (an optional `sha256=` prefix is accepted). With
//! no secret configured every webhook is refused.

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{sea_query::OnConflict, EntityTrait};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{payment_attempt, processed_webhook_event},
    errors::ServiceError,
    metrics::PAYMENT_METRICS,
    models::ConfirmationSource,
    services::payment_ledger::{ConfirmOutcome, PaymentLedger, ProviderConfirmation},
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Provider event id; redeliveries carry the same id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Provider payment id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub metadata: WebhookMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMetadata {
    #[serde(default)]
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Ledger entry id sent when the checkout was opened.
    #[serde(default)]
    pub attempt_id: Option<String>,
}

/// What happened to an authentic webhook. All of these are acknowledged
/// with 200 so the provider stops redelivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed,
    AlreadyConfirmed,
    AttemptNotPending,
    Failed,
    Duplicate,
    Ignored,
    Unmatched,
}

impl From<ConfirmOutcome> for WebhookOutcome {
    fn from(outcome: ConfirmOutcome) -> Self {
        match outcome {
            ConfirmOutcome::Confirmed => WebhookOutcome::Confirmed,
            ConfirmOutcome::AlreadyConfirmed => WebhookOutcome::AlreadyConfirmed,
            ConfirmOutcome::AttemptNotPending => WebhookOutcome::AttemptNotPending,
        }
    }
}

/// Checks `signature` against the HMAC of `body`. Comparison is constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), ServiceError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ServiceError::WebhookSignatureInvalid)?;
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = hex::decode(signature).map_err(|_| ServiceError::WebhookSignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid webhook secret: {e}")))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| ServiceError::WebhookSignatureInvalid)
}

#[derive(Clone)]
pub struct WebhookService {
    db: Arc<DbPool>,
    ledger: PaymentLedger,
    secret: Option<String>,
}

impl WebhookService {
    pub fn new(db: Arc<DbPool>, secret: Option<String>) -> Self {
        Self {
            ledger: PaymentLedger::new(db.clone()),
            db,
            secret: secret.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Verifies and applies one delivery. Nothing is read from the body
    /// before the signature has been checked.
    #[instrument(skip(self, signature, body), fields(body_len = body.len()))]
    pub async fn handle(&self, signature: Option<&str>, body: &[u8]) -> Result<WebhookOutcome, ServiceError> {
        let Some(secret) = self.secret.as_deref() else {
            PAYMENT_METRICS.webhooks_rejected.inc();
            warn!("payment webhook refused: no webhook secret configured");
            return Err(ServiceError::WebhookSecretMissing);
        };

        if let Err(err) = verify_signature(secret, body, signature) {
            PAYMENT_METRICS.webhooks_rejected.inc();
            warn!(signature_present = signature.is_some(), "payment webhook signature rejected");
            return Err(err);
        }

        // Redelivering an unreadable body cannot help, so it is acknowledged.
        let event: WebhookEvent = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "ignoring signed webhook with unreadable payload");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        if let Some(event_id) = event.id.as_deref() {
            if processed_webhook_event::Entity::find_by_id(event_id.to_string())
                .one(&*self.db)
                .await?
                .is_some()
            {
                PAYMENT_METRICS.webhooks_duplicate.inc();
                info!(event_id, "webhook event already processed");
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let outcome = self.apply(&event).await?;

        if let Some(event_id) = event.id.as_deref() {
            self.record_processed(event_id, &event.event_type).await?;
        }

        info!(event_type = %event.event_type, event_id = ?event.id, %outcome, "payment webhook processed");
        Ok(outcome)
    }

    async fn apply(&self, event: &WebhookEvent) -> Result<WebhookOutcome, ServiceError> {
        let is_success = event.event_type == EVENT_PAYMENT_SUCCEEDED;
        if !is_success && event.event_type != EVENT_PAYMENT_FAILED {
            info!(event_type = %event.event_type, "ignoring unhandled webhook type");
            return Ok(WebhookOutcome::Ignored);
        }

        let Some(attempt) = self.find_attempt(&event.payload).await? else {
            warn!(
                event_type = %event.event_type,
                checkout_id = ?event.payload.metadata.checkout_id.as_ref().or(event.payload.checkout_id.as_ref()),
                attempt_id = ?event.payload.metadata.attempt_id,
                order_id = ?event.payload.metadata.order_id,
                "webhook does not match any payment attempt"
            );
            return Ok(WebhookOutcome::Unmatched);
        };

        if is_success {
            let outcome = self
                .ledger
                .confirm(
                    attempt.order_id,
                    ConfirmationSource::Webhook,
                    Some(ProviderConfirmation {
                        attempt_id: attempt.id,
                        provider_payment_id: event.payload.id.clone(),
                    }),
                )
                .await?;
            return Ok(outcome.into());
        }

        let reason = event
            .payload
            .failure_reason
            .clone()
            .or_else(|| event.payload.status.clone())
            .unwrap_or_else(|| "payment failed".to_string());
        if self.ledger.mark_failed(attempt.id, &reason).await? {
            Ok(WebhookOutcome::Failed)
        } else {
            Ok(WebhookOutcome::AttemptNotPending)
        }
    }

    /// Resolves the ledger entry an event refers to. The attempt id wins,
    /// then the checkout id; the order's latest pending entry is used only
    /// when the event names neither.
    async fn find_attempt(
        &self,
        payload: &WebhookPayload,
    ) -> Result<Option<payment_attempt::Model>, ServiceError> {
        let checkout_id = payload
            .metadata
            .checkout_id
            .as_deref()
            .or(payload.checkout_id.as_deref());
        let order_id = match payload.metadata.order_id.as_deref() {
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => Some(id),
                Err(_) => return Ok(None),
            },
            None => None,
        };
        let belongs = |attempt: &payment_attempt::Model| {
            checkout_id.map_or(true, |id| id == attempt.provider_checkout_id)
                && order_id.map_or(true, |id| id == attempt.order_id)
        };

        if let Some(raw) = payload.metadata.attempt_id.as_deref() {
            let Ok(attempt_id) = Uuid::parse_str(raw) else {
                return Ok(None);
            };
            return Ok(self.ledger.find(attempt_id).await?.filter(belongs));
        }

        if let Some(checkout_id) = checkout_id {
            return Ok(self
                .ledger
                .find_by_checkout_id(checkout_id)
                .await?
                .filter(belongs));
        }

        match order_id {
            Some(order_id) => PaymentLedger::latest_pending(&*self.db, order_id).await,
            None => Ok(None),
        }
    }

    async fn record_processed(&self, event_id: &str, event_type: &str) -> Result<(), ServiceError> {
        processed_webhook_event::Entity::insert(processed_webhook_event::ActiveModel {
            event_id: sea_orm::Set(event_id.to_string()),
            event_type: sea_orm::Set(event_type.to_string()),
            received_at: sea_orm::Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::column(processed_webhook_event::Column::EventId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&*self.db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
