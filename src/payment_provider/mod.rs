//! Client side of the card-payment processor.
//!
//! Services only see the [`PaymentProvider`] trait; [`HttpPaymentProvider`]
//! is the production implementation speaking the provider's checkout API.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{is_accepted_provider_status, is_closed_provider_status};

pub use http::HttpPaymentProvider;

/// Parameters for opening a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckout {
    /// Minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub failure_url: String,
    pub order_id: Uuid,
    /// Also sent as the idempotency key, so a retried create never opens a
    /// second session for the same attempt.
    pub attempt_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStatus {
    pub status: String,
    #[serde(default)]
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentStatus {
    pub status: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure, timeout or 5xx. The customer may retry.
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request (4xx).
    #[error("payment provider rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected payment provider response: {0}")]
    InvalidResponse(String),

    #[error("invalid payment provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        crate::metrics::PAYMENT_METRICS.provider_errors.inc();
        match err {
            ProviderError::Unavailable(msg) => ServiceError::ProviderUnavailable(msg),
            other => ServiceError::ProviderError(other.to_string()),
        }
    }
}

/// Operations the reconciliation core needs from the payment processor.
/// Every call is made with the restaurant's own secret key.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout(
        &self,
        secret_key: &str,
        request: &CreateCheckout,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn get_checkout(
        &self,
        secret_key: &str,
        checkout_id: &str,
    ) -> Result<CheckoutStatus, ProviderError>;

    async fn get_payment(
        &self,
        secret_key: &str,
        payment_id: &str,
    ) -> Result<PaymentStatus, ProviderError>;
}

/// What the provider currently reports for one checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPaymentState {
    pub checkout_status: String,
    /// Only fetched when the checkout itself is not yet settled.
    pub payment_status: Option<String>,
    pub payment_id: Option<String>,
}

impl ProviderPaymentState {
    pub fn is_paid(&self) -> bool {
        is_accepted_provider_status(&self.checkout_status)
            || self
                .payment_status
                .as_deref()
                .is_some_and(is_accepted_provider_status)
    }

    /// The checkout can no longer be paid.
    pub fn is_closed(&self) -> bool {
        !self.is_paid()
            && (is_closed_provider_status(&self.checkout_status)
                || self
                    .payment_status
                    .as_deref()
                    .is_some_and(is_closed_provider_status))
    }
}

/// Reads the checkout and, when the provider names a payment behind a
/// checkout that is not yet settled, that payment as well.
pub async fn query_payment_state(
    provider: &dyn PaymentProvider,
    secret_key: &str,
    checkout_id: &str,
    known_payment_id: Option<String>,
) -> Result<ProviderPaymentState, ProviderError> {
    let checkout = provider.get_checkout(secret_key, checkout_id).await?;
    let payment_id = checkout.payment_id.or(known_payment_id);

    let payment_status = match payment_id.as_deref() {
        Some(id) if !is_accepted_provider_status(&checkout.status) => {
            Some(provider.get_payment(secret_key, id).await?.status)
        }
        _ => None,
    };

    Ok(ProviderPaymentState {
        checkout_status: checkout.status,
        payment_status,
        payment_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(checkout: &str, payment: Option<&str>) -> ProviderPaymentState {
        ProviderPaymentState {
            checkout_status: checkout.into(),
            payment_status: payment.map(Into::into),
            payment_id: None,
        }
    }

    #[test]
    fn paid_when_checkout_or_payment_is_accepted() {
        assert!(state("completed", None).is_paid());
        assert!(state("started", Some("approved")).is_paid());
        assert!(!state("started", Some("pending")).is_paid());
    }

    #[test]
    fn closed_only_without_an_accepted_payment() {
        assert!(state("expired", None).is_closed());
        assert!(state("started", Some("declined")).is_closed());
        assert!(!state("expired", Some("succeeded")).is_closed());
        assert!(!state("started", None).is_closed());
    }
}
