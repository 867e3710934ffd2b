//! Customer-triggered fallback for a webhook that never arrived: polls the
//! provider for a bounded window and confirms through the shared ledger
//! operation. Nothing runs in the background and a timeout mutates nothing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::DbPool,
    errors::ServiceError,
    metrics::PAYMENT_METRICS,
    models::{ConfirmationSource, PaymentAttemptStatus},
    payment_provider::{query_payment_state, PaymentProvider},
    services::{
        orders::{ensure_order_access, load_order},
        payment_ledger::{ConfirmOutcome, PaymentLedger, ProviderConfirmation},
        restaurants::RestaurantService,
    },
};

pub const REASON_ALREADY_CONFIRMED: &str = "already_confirmed";
pub const REASON_NO_PENDING_PAYMENT: &str = "no_pending_payment";
pub const REASON_PAYMENT_FAILED: &str = "payment_failed";
pub const REASON_TIMEOUT: &str = "timeout";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Last checkout status seen at the provider (timeouts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
}

impl ReconcileResponse {
    fn confirmed(reason: Option<&str>) -> Self {
        Self {
            confirmed: true,
            reason: reason.map(str::to_string),
            checkout_status: None,
            payment_status: None,
        }
    }

    fn unconfirmed(reason: &str) -> Self {
        Self {
            confirmed: false,
            reason: Some(reason.to_string()),
            checkout_status: None,
            payment_status: None,
        }
    }
}

#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DbPool>,
    provider: Arc<dyn PaymentProvider>,
    ledger: PaymentLedger,
    restaurants: RestaurantService,
    window: Duration,
    interval: Duration,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DbPool>,
        provider: Arc<dyn PaymentProvider>,
        window: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            ledger: PaymentLedger::new(db.clone()),
            restaurants: RestaurantService::new(db.clone()),
            db,
            provider,
            window,
            interval,
        }
    }

    #[instrument(skip(self, user), fields(order_id = %order_id))]
    pub async fn reconcile(
        &self,
        user: &AuthUser,
        order_id: Uuid,
    ) -> Result<ReconcileResponse, ServiceError> {
        user.require_customer()?;
        let db = &*self.db;
        let order = load_order(db, order_id).await?;
        ensure_order_access(db, &order, user).await?;

        if order.payment_confirmed {
            return Ok(ReconcileResponse::confirmed(Some(REASON_ALREADY_CONFIRMED)));
        }

        let Some(attempt) = PaymentLedger::latest_pending(db, order_id).await? else {
            // The attempt may have been completed since the order was read.
            if load_order(db, order_id).await?.payment_confirmed {
                return Ok(ReconcileResponse::confirmed(Some(REASON_ALREADY_CONFIRMED)));
            }
            return Ok(ReconcileResponse::unconfirmed(REASON_NO_PENDING_PAYMENT));
        };

        let secret_key = self
            .restaurants
            .credentials_for(order.restaurant_id)
            .await?
            .ok_or(ServiceError::CredentialsMissing(order.restaurant_id))?;

        let deadline = Instant::now() + self.window;
        let mut checkout_status = None;
        let mut payment_status = None;
        let mut polls = 0u32;

        loop {
            polls += 1;

            // A webhook or a cash selection may have settled the order
            // between polls.
            if load_order(db, order_id).await?.payment_confirmed {
                return Ok(ReconcileResponse::confirmed(Some(REASON_ALREADY_CONFIRMED)));
            }
            let current = self
                .ledger
                .find(attempt.id)
                .await?
                .ok_or_else(|| ServiceError::InternalError("payment attempt vanished".into()))?;
            match current.status {
                PaymentAttemptStatus::Completed => {
                    return Ok(ReconcileResponse::confirmed(Some(REASON_ALREADY_CONFIRMED)))
                }
                PaymentAttemptStatus::Failed => {
                    return Ok(ReconcileResponse::unconfirmed(REASON_PAYMENT_FAILED))
                }
                PaymentAttemptStatus::Pending => {}
            }

            // A slow provider call must not carry the poll past its window.
            let Ok(polled) = timeout_at(
                deadline,
                query_payment_state(
                    self.provider.as_ref(),
                    &secret_key,
                    &current.provider_checkout_id,
                    current.provider_payment_id.clone(),
                ),
            )
            .await
            else {
                warn!(polls, "provider did not answer before the reconciliation window closed");
                break;
            };

            match polled {
                Ok(state) => {
                    let paid = state.is_paid();
                    checkout_status = Some(state.checkout_status);
                    if state.payment_status.is_some() {
                        payment_status = state.payment_status;
                    }
                    if paid {
                        let outcome = self
                            .ledger
                            .confirm(
                                order_id,
                                ConfirmationSource::Poll,
                                Some(ProviderConfirmation {
                                    attempt_id: current.id,
                                    provider_payment_id: state.payment_id,
                                }),
                            )
                            .await?;
                        info!(%outcome, polls, "reconciliation settled payment");
                        return Ok(match outcome {
                            ConfirmOutcome::Confirmed => ReconcileResponse::confirmed(None),
                            ConfirmOutcome::AlreadyConfirmed => {
                                ReconcileResponse::confirmed(Some(REASON_ALREADY_CONFIRMED))
                            }
                            ConfirmOutcome::AttemptNotPending => {
                                ReconcileResponse::unconfirmed(REASON_PAYMENT_FAILED)
                            }
                        });
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!(error = %err, polls, "provider unavailable during reconciliation, retrying");
                }
                Err(err) => return Err(err.into()),
            }

            if Instant::now() + self.interval >= deadline {
                break;
            }
            sleep(self.interval).await;
        }

        PAYMENT_METRICS.poll_timeouts.inc();
        info!(polls, checkout_status = ?checkout_status, payment_status = ?payment_status, "reconciliation window elapsed");
        Ok(ReconcileResponse {
            confirmed: false,
            reason: Some(REASON_TIMEOUT.to_string()),
            checkout_status,
            payment_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::models::PaymentMethod;
    use crate::payment_provider::ProviderError;
    use crate::services::payment_ledger::NewAttempt;
    use crate::test_support::{seed_confirmed_order, setup_db, FakeProvider, Seeded};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;

    fn customer(seeded: &Seeded) -> AuthUser {
        AuthUser {
            user_id: seeded.customer_id,
            role: Role::Customer,
        }
    }

    fn service(db: Arc<DbPool>, provider: Arc<FakeProvider>) -> ReconciliationService {
        ReconciliationService::new(
            db,
            provider,
            Duration::from_millis(120),
            Duration::from_millis(20),
        )
    }

    async fn with_pending_attempt() -> (Arc<DbPool>, Seeded, Uuid) {
        let db = setup_db().await;
        let seeded = seed_confirmed_order(&db, dec!(150.00)).await;
        let attempt = PaymentLedger::insert_pending(
            &*db,
            NewAttempt {
                id: Uuid::new_v4(),
                order_id: seeded.order_id,
                provider_checkout_id: "ch_poll".into(),
                amount: 15000,
                currency: "ZAR".into(),
                redirect_url: "https://pay.test/ch_poll".into(),
            },
        )
        .await
        .unwrap();
        (db, seeded, attempt.id)
    }

    #[tokio::test]
    async fn already_paid_order_short_circuits() {
        let db = setup_db().await;
        let seeded = seed_confirmed_order(&db, dec!(150.00)).await;
        PaymentLedger::new(db.clone())
            .confirm(seeded.order_id, ConfirmationSource::Cash, None)
            .await
            .unwrap();
        let provider = Arc::new(FakeProvider::default());

        let response = service(db, provider.clone())
            .reconcile(&customer(&seeded), seeded.order_id)
            .await
            .unwrap();
        assert!(response.confirmed);
        assert_eq!(response.reason.as_deref(), Some(REASON_ALREADY_CONFIRMED));
        assert_eq!(provider.checkout_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_pending_attempt_is_reported() {
        let db = setup_db().await;
        let seeded = seed_confirmed_order(&db, dec!(150.00)).await;
        let response = service(db, Arc::new(FakeProvider::default()))
            .reconcile(&customer(&seeded), seeded.order_id)
            .await
            .unwrap();
        assert_eq!(response, ReconcileResponse::unconfirmed(REASON_NO_PENDING_PAYMENT));
    }

    #[tokio::test]
    async fn completed_checkout_confirms_order() {
        let (db, seeded, attempt_id) = with_pending_attempt().await;
        let provider = Arc::new(FakeProvider::default());
        provider.set_checkout("completed", Some("p_42"));

        let response = service(db.clone(), provider)
            .reconcile(&customer(&seeded), seeded.order_id)
            .await
            .unwrap();
        assert!(response.confirmed);
        assert_eq!(response.reason, None);

        let order = load_order(&*db, seeded.order_id).await.unwrap();
        assert!(order.payment_confirmed);
        assert_eq!(order.payment_method, Some(PaymentMethod::Online));
        let attempt = PaymentLedger::new(db).find(attempt_id).await.unwrap().unwrap();
        assert_eq!(attempt.status, PaymentAttemptStatus::Completed);
        assert_eq!(attempt.provider_payment_id.as_deref(), Some("p_42"));
    }

    #[tokio::test]
    async fn approved_payment_behind_open_checkout_confirms() {
        let (db, seeded, _) = with_pending_attempt().await;
        let provider = Arc::new(FakeProvider::default());
        provider.set_checkout("started", Some("p_7"));
        provider.set_payment("APPROVED");

        let response = service(db.clone(), provider.clone())
            .reconcile(&customer(&seeded), seeded.order_id)
            .await
            .unwrap();
        assert!(response.confirmed);
        assert_eq!(provider.payment_calls.load(Ordering::SeqCst), 1);
        assert!(load_order(&*db, seeded.order_id).await.unwrap().payment_confirmed);
    }

    #[tokio::test]
    async fn times_out_without_mutation() {
        let (db, seeded, attempt_id) = with_pending_attempt().await;
        let provider = Arc::new(FakeProvider::default());
        provider.set_checkout("started", None);

        let started = Instant::now();
        let response = service(db.clone(), provider.clone())
            .reconcile(&customer(&seeded), seeded.order_id)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        assert!(!response.confirmed);
        assert_eq!(response.reason.as_deref(), Some(REASON_TIMEOUT));
        assert_eq!(response.checkout_status.as_deref(), Some("started"));
        assert!(provider.checkout_calls.load(Ordering::SeqCst) >= 2);

        assert!(!load_order(&*db, seeded.order_id).await.unwrap().payment_confirmed);
        let attempt = PaymentLedger::new(db).find(attempt_id).await.unwrap().unwrap();
        assert_eq!(attempt.status, PaymentAttemptStatus::Pending);
    }

    #[tokio::test]
    async fn slow_provider_cannot_stretch_the_window() {
        let (db, seeded, attempt_id) = with_pending_attempt().await;
        let provider = Arc::new(FakeProvider::default());
        provider.set_checkout("started", Some("p_slow"));
        provider.set_delay(Duration::from_millis(900));
        let poller = ReconciliationService::new(
            db.clone(),
            provider.clone(),
            Duration::from_millis(200),
            Duration::from_millis(20),
        );

        let started = Instant::now();
        let response = poller
            .reconcile(&customer(&seeded), seeded.order_id)
            .await
            .unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(600),
            "poll ran for {:?}",
            started.elapsed()
        );

        assert!(!response.confirmed);
        assert_eq!(response.reason.as_deref(), Some(REASON_TIMEOUT));
        assert_eq!(response.checkout_status, None);
        assert_eq!(provider.checkout_calls.load(Ordering::SeqCst), 1);
        let attempt = PaymentLedger::new(db).find(attempt_id).await.unwrap().unwrap();
        assert_eq!(attempt.status, PaymentAttemptStatus::Pending);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_timeout() {
        let (db, seeded, _) = with_pending_attempt().await;
        let provider = Arc::new(FakeProvider::default());
        provider.set_checkout_error(ProviderError::Unavailable("503".into()));

        let response = service(db, provider.clone())
            .reconcile(&customer(&seeded), seeded.order_id)
            .await
            .unwrap();
        assert_eq!(response.reason.as_deref(), Some(REASON_TIMEOUT));
        assert_eq!(response.checkout_status, None);
        assert!(provider.checkout_calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn permanent_provider_errors_surface() {
        let (db, seeded, _) = with_pending_attempt().await;
        let provider = Arc::new(FakeProvider::default());
        provider.set_checkout_error(ProviderError::Rejected {
            status: 404,
            message: "checkout not found".into(),
        });

        assert_matches!(
            service(db, provider)
                .reconcile(&customer(&seeded), seeded.order_id)
                .await,
            Err(ServiceError::ProviderError(_))
        );
    }

    #[tokio::test]
    async fn poll_and_webhook_race_converges() {
        let (db, seeded, attempt_id) = with_pending_attempt().await;
        let provider = Arc::new(FakeProvider::default());
        provider.set_checkout("successful", Some("p_1"));
        let poller = service(db.clone(), provider);
        let ledger = PaymentLedger::new(db.clone());

        let user = customer(&seeded);
        let (polled, webhook) = tokio::join!(
            poller.reconcile(&user, seeded.order_id),
            ledger.confirm(
                seeded.order_id,
                ConfirmationSource::Webhook,
                Some(ProviderConfirmation {
                    attempt_id,
                    provider_payment_id: Some("p_1".into()),
                }),
            ),
        );
        assert!(polled.unwrap().confirmed);
        assert!(webhook.unwrap().is_confirmed());

        let attempts = ledger.list_for_order(seeded.order_id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, PaymentAttemptStatus::Completed);
        assert!(load_order(&*db, seeded.order_id).await.unwrap().payment_confirmed);
    }

    #[tokio::test]
    async fn failed_attempt_ends_polling() {
        let (db, seeded, attempt_id) = with_pending_attempt().await;
        let ledger = PaymentLedger::new(db.clone());
        let provider = Arc::new(FakeProvider::default());
        let poller = service(db.clone(), provider.clone());

        // The attempt fails after it was selected as the pending one.
        let user = customer(&seeded);
        let (response, failed) = tokio::join!(poller.reconcile(&user, seeded.order_id), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            ledger.mark_failed(attempt_id, "declined").await
        });
        assert!(failed.unwrap());
        let response = response.unwrap();
        assert!(!response.confirmed);
        assert_eq!(response.reason.as_deref(), Some(REASON_PAYMENT_FAILED));
    }
}
