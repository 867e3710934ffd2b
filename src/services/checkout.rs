//! Opens provider-hosted checkout sessions and records the matching
//! pending ledger entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{order, payment_attempt},
    errors::ServiceError,
    metrics::PAYMENT_METRICS,
    models::{is_closed_provider_status, to_minor_units, ConfirmationSource, PaymentMethod},
    payment_provider::{query_payment_state, CreateCheckout, PaymentProvider},
    services::{
        order_status::ensure_awaiting_payment,
        orders::{ensure_order_access, load_order},
        payment_ledger::{NewAttempt, PaymentLedger, ProviderConfirmation},
        restaurants::RestaurantService,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub order_id: Uuid,
    #[validate(url)]
    pub success_url: String,
    #[validate(url)]
    pub cancel_url: String,
    #[validate(url)]
    pub failure_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_id: String,
    /// Provider-hosted page the customer is redirected to.
    pub checkout_url: String,
    pub attempt_id: Uuid,
    /// True when an existing pending checkout was handed back.
    pub reused: bool,
    /// True when an earlier checkout turned out to be paid already; no new
    /// session was opened.
    pub payment_confirmed: bool,
}

impl CheckoutResponse {
    fn from_attempt(attempt: payment_attempt::Model, reused: bool) -> Self {
        Self {
            checkout_id: attempt.provider_checkout_id,
            checkout_url: attempt.redirect_url,
            attempt_id: attempt.id,
            reused,
            payment_confirmed: false,
        }
    }
}

/// What the provider says about a pending entry that is too old to hand
/// back without asking.
enum StaleCheckout {
    /// The customer paid it; the order is now confirmed.
    Paid(payment_attempt::Model),
    /// Still payable at the provider.
    Open(payment_attempt::Model),
    /// Ended without payment; retired when the new entry is recorded.
    Closed {
        attempt: payment_attempt::Model,
        reason: String,
    },
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    provider: Arc<dyn PaymentProvider>,
    ledger: PaymentLedger,
    restaurants: RestaurantService,
    reuse_window: Duration,
}

impl CheckoutService {
    pub fn new(db: Arc<DbPool>, provider: Arc<dyn PaymentProvider>, reuse_window: Duration) -> Self {
        Self {
            ledger: PaymentLedger::new(db.clone()),
            restaurants: RestaurantService::new(db.clone()),
            db,
            provider,
            reuse_window,
        }
    }

    /// Returns a checkout the customer can pay.
    ///
    /// A recent pending entry for the same amount is handed back as is. An
    /// older one is checked with the provider first: if it was paid the
    /// order is confirmed, if it is still open it is handed back, and only
    /// a checkout the provider reports as ended is retired in favour of a
    /// new session. At most one pending entry per order survives concurrent
    /// calls.
    #[instrument(skip(self, user, request), fields(order_id = %request.order_id))]
    pub async fn start_checkout(
        &self,
        user: &AuthUser,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;
        user.require_customer()?;

        let db = &*self.db;
        let order = load_order(db, request.order_id).await?;
        ensure_order_access(db, &order, user).await?;
        ensure_awaiting_payment(&order)?;

        let secret_key = self
            .restaurants
            .credentials_for(order.restaurant_id)
            .await?
            .ok_or_else(|| {
                warn!(restaurant_id = %order.restaurant_id, "restaurant has no payment credentials");
                ServiceError::CredentialsMissing(order.restaurant_id)
            })?;

        let amount = to_minor_units(order.total_amount)
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let mut retired = None;
        if let Some(existing) = PaymentLedger::latest_pending(db, order.id).await? {
            if self.is_reusable(&existing, amount, &order.currency) {
                PAYMENT_METRICS.checkouts_reused.inc();
                info!(attempt_id = %existing.id, "reusing pending checkout");
                return Ok(CheckoutResponse::from_attempt(existing, true));
            }

            match self.inspect_stale(&secret_key, order.id, existing).await? {
                StaleCheckout::Paid(attempt) => {
                    let mut response = CheckoutResponse::from_attempt(attempt, true);
                    response.payment_confirmed = true;
                    return Ok(response);
                }
                StaleCheckout::Open(attempt) => {
                    if attempt.amount != amount || attempt.currency != order.currency {
                        warn!(attempt_id = %attempt.id, "previous checkout still open with a different amount");
                        return Err(ServiceError::Conflict(
                            "a previous checkout for this order is still open at the payment provider"
                                .into(),
                        ));
                    }
                    PAYMENT_METRICS.checkouts_reused.inc();
                    info!(attempt_id = %attempt.id, "previous checkout still open, reusing it");
                    return Ok(CheckoutResponse::from_attempt(attempt, true));
                }
                StaleCheckout::Closed { attempt, reason } => retired = Some((attempt, reason)),
            }
        }

        let attempt_id = Uuid::new_v4();
        let session = self
            .provider
            .create_checkout(
                &secret_key,
                &CreateCheckout {
                    amount,
                    currency: order.currency.clone(),
                    success_url: request.success_url,
                    cancel_url: request.cancel_url,
                    failure_url: request.failure_url,
                    order_id: order.id,
                    attempt_id,
                },
            )
            .await?;

        // The ended entry is retired together with recording the new one, so
        // a failed create above leaves the ledger as it was.
        let txn = db.begin().await?;
        if let Some((stale, reason)) = &retired {
            if PaymentLedger::supersede(&txn, stale.id, reason).await? {
                info!(attempt_id = %stale.id, %reason, "retired ended checkout");
            }
        }

        let inserted = PaymentLedger::insert_pending(
            &txn,
            NewAttempt {
                id: attempt_id,
                order_id: order.id,
                provider_checkout_id: session.id.clone(),
                amount,
                currency: order.currency.clone(),
                redirect_url: session.redirect_url,
            },
        )
        .await;

        let attempt = match inserted {
            Ok(attempt) => attempt,
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                txn.rollback().await?;
                // A concurrent request recorded its checkout first; ours is
                // left unused at the provider and expires there.
                info!(orphaned_checkout = %session.id, "lost checkout race, returning winner");
                let winner = PaymentLedger::latest_pending(db, order.id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Conflict("a payment for this order is already in progress".into())
                    })?;
                PAYMENT_METRICS.checkouts_reused.inc();
                return Ok(CheckoutResponse::from_attempt(winner, true));
            }
            Err(err) => {
                txn.rollback().await?;
                return Err(err.into());
            }
        };

        order::Entity::update_many()
            .set(order::ActiveModel {
                payment_method: Set(Some(PaymentMethod::Online)),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentMethod.is_null())
            .exec(&txn)
            .await?;
        txn.commit().await?;

        PAYMENT_METRICS.checkouts_created.inc();
        info!(attempt_id = %attempt.id, checkout_id = %attempt.provider_checkout_id, amount, "checkout created");
        Ok(CheckoutResponse::from_attempt(attempt, false))
    }

    /// Asks the provider about a pending entry outside the reuse window. A
    /// payment found here is confirmed like any other poll result.
    async fn inspect_stale(
        &self,
        secret_key: &str,
        order_id: Uuid,
        attempt: payment_attempt::Model,
    ) -> Result<StaleCheckout, ServiceError> {
        let state = query_payment_state(
            self.provider.as_ref(),
            secret_key,
            &attempt.provider_checkout_id,
            attempt.provider_payment_id.clone(),
        )
        .await?;

        if state.is_paid() {
            let outcome = self
                .ledger
                .confirm(
                    order_id,
                    ConfirmationSource::Poll,
                    Some(ProviderConfirmation {
                        attempt_id: attempt.id,
                        provider_payment_id: state.payment_id.clone(),
                    }),
                )
                .await?;
            if outcome.is_confirmed() {
                info!(attempt_id = %attempt.id, %outcome, "earlier checkout was already paid");
                return Ok(StaleCheckout::Paid(attempt));
            }
            // Failed in the meantime; nothing left to retire.
            return Ok(StaleCheckout::Closed {
                attempt,
                reason: "superseded".into(),
            });
        }

        if state.is_closed() {
            let status = state
                .payment_status
                .filter(|s| is_closed_provider_status(s))
                .unwrap_or(state.checkout_status);
            return Ok(StaleCheckout::Closed {
                attempt,
                reason: format!("superseded: checkout {}", status.trim().to_ascii_lowercase()),
            });
        }

        Ok(StaleCheckout::Open(attempt))
    }

    fn is_reusable(&self, attempt: &payment_attempt::Model, amount: i64, currency: &str) -> bool {
        if attempt.amount != amount || attempt.currency != currency {
            return false;
        }
        // A creation time in the future (clock skew) counts as fresh.
        Utc::now()
            .signed_duration_since(attempt.created_at)
            .to_std()
            .map_or(true, |age| age < self.reuse_window)
    }
}
