//! Payment ledger and the single confirmation operation shared by the
//! webhook, the reconciliation poll and cash selection.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{order, payment_attempt},
    errors::ServiceError,
    metrics::PAYMENT_METRICS,
    models::{ConfirmationSource, OrderStatus, PaymentAttemptStatus},
    services::orders::{ensure_order_access, load_order},
};

/// Result of [`PaymentLedger::confirm`]. Every variant is a success from the
/// caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmOutcome {
    /// This call flipped the order to paid.
    Confirmed,
    /// Someone else got there first; nothing changed.
    AlreadyConfirmed,
    /// The ledger entry is already `failed`; nothing changed.
    AttemptNotPending,
}

impl ConfirmOutcome {
    pub fn is_confirmed(self) -> bool {
        !matches!(self, ConfirmOutcome::AttemptNotPending)
    }
}

/// Identifies the ledger entry an online confirmation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfirmation {
    pub attempt_id: Uuid,
    pub provider_payment_id: Option<String>,
}

/// Ledger entry as shown to the order's parties. Never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentAttemptResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: PaymentAttemptStatus,
    pub provider_checkout_id: String,
    pub provider_payment_id: Option<String>,
    /// Minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<payment_attempt::Model> for PaymentAttemptResponse {
    fn from(model: payment_attempt::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            status: model.status,
            provider_checkout_id: model.provider_checkout_id,
            provider_payment_id: model.provider_payment_id,
            amount: model.amount,
            currency: model.currency,
            failure_reason: model.failure_reason,
            created_at: model.created_at,
            completed_at: model.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentAttemptList {
    pub order_id: Uuid,
    pub attempts: Vec<PaymentAttemptResponse>,
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_checkout_id: String,
    pub amount: i64,
    pub currency: String,
    pub redirect_url: String,
}

#[derive(Clone)]
pub struct PaymentLedger {
    db: Arc<DbPool>,
}

impl PaymentLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Marks an order as paid, exactly once.
    ///
    /// Online sources first move the ledger entry `pending -> completed`,
    /// then flip `orders.payment_confirmed`. Both steps are conditional
    /// updates in one transaction, so concurrent callers converge: one gets
    /// `Confirmed`, the rest `AlreadyConfirmed`.
    #[instrument(skip(self, attempt), fields(order_id = %order_id, source = %source))]
    pub async fn confirm(
        &self,
        order_id: Uuid,
        source: ConfirmationSource,
        attempt: Option<ProviderConfirmation>,
    ) -> Result<ConfirmOutcome, ServiceError> {
        match (source, &attempt) {
            (ConfirmationSource::Cash, None) => {}
            (ConfirmationSource::Cash, Some(_)) => {
                return Err(ServiceError::InternalError(
                    "cash confirmation cannot reference a payment attempt".into(),
                ))
            }
            (_, None) => {
                return Err(ServiceError::InternalError(
                    "online confirmation requires a payment attempt".into(),
                ))
            }
            (_, Some(_)) => {}
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        if let Some(confirmation) = &attempt {
            let ledger = payment_attempt::Entity::update_many()
                .set(payment_attempt::ActiveModel {
                    status: Set(PaymentAttemptStatus::Completed),
                    provider_payment_id: confirmation
                        .provider_payment_id
                        .clone()
                        .map_or(NotSet, |id| Set(Some(id))),
                    updated_at: Set(now),
                    completed_at: Set(Some(now)),
                    ..Default::default()
                })
                .filter(payment_attempt::Column::Id.eq(confirmation.attempt_id))
                .filter(payment_attempt::Column::OrderId.eq(order_id))
                .filter(payment_attempt::Column::Status.eq(PaymentAttemptStatus::Pending))
                .exec(&txn)
                .await?;

            if ledger.rows_affected == 0 {
                let current = payment_attempt::Entity::find_by_id(confirmation.attempt_id)
                    .one(&txn)
                    .await?
                    .filter(|a| a.order_id == order_id)
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "payment attempt {} for order {}",
                            confirmation.attempt_id, order_id
                        ))
                    })?;
                txn.rollback().await?;

                return match current.status {
                    PaymentAttemptStatus::Completed => {
                        info!(attempt_id = %current.id, "payment attempt already completed");
                        PAYMENT_METRICS.already_confirmed.inc();
                        Ok(ConfirmOutcome::AlreadyConfirmed)
                    }
                    PaymentAttemptStatus::Failed => {
                        warn!(
                            attempt_id = %current.id,
                            failure_reason = current.failure_reason.as_deref().unwrap_or(""),
                            "success reported for a payment attempt that is no longer pending"
                        );
                        Ok(ConfirmOutcome::AttemptNotPending)
                    }
                    PaymentAttemptStatus::Pending => Err(ServiceError::Conflict(format!(
                        "payment attempt {} changed concurrently",
                        current.id
                    ))),
                };
            }
        }

        let mut flip = order::Entity::update_many()
            .set(order::ActiveModel {
                payment_confirmed: Set(true),
                payment_method: Set(Some(source.payment_method())),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentConfirmed.eq(false));
        if source == ConfirmationSource::Cash {
            flip = flip.filter(order::Column::Status.eq(OrderStatus::Confirmed));
        }
        let flipped = flip.exec(&txn).await?.rows_affected;

        if flipped == 0 {
            if source == ConfirmationSource::Cash {
                let current = order::Entity::find_by_id(order_id)
                    .one(&txn)
                    .await?
                    .ok_or(ServiceError::OrderNotFound(order_id))?;
                txn.rollback().await?;
                if current.payment_confirmed {
                    PAYMENT_METRICS.already_confirmed.inc();
                    return Ok(ConfirmOutcome::AlreadyConfirmed);
                }
                return Err(ServiceError::InvalidOperation(format!(
                    "order {} is {} and no longer awaiting payment",
                    order_id, current.status
                )));
            }

            // The ledger entry stays completed: money was taken and must be
            // refunded by hand.
            txn.commit().await?;
            PAYMENT_METRICS.double_payments.inc();
            error!(
                attempt_id = ?attempt.as_ref().map(|a| a.attempt_id),
                existing_method = ?order.payment_method,
                "order was already paid; online payment needs a manual refund"
            );
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }

        txn.commit().await?;

        if order.status == OrderStatus::Cancelled {
            warn!("payment confirmed for a cancelled order; refund required");
        }
        PAYMENT_METRICS.record_confirmation(source);
        info!("order payment confirmed");
        Ok(ConfirmOutcome::Confirmed)
    }

    /// `pending -> failed`. Returns false when the entry was not pending.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, attempt_id: Uuid, reason: &str) -> Result<bool, ServiceError> {
        let result = payment_attempt::Entity::update_many()
            .set(payment_attempt::ActiveModel {
                status: Set(PaymentAttemptStatus::Failed),
                failure_reason: Set(Some(reason.to_string())),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(payment_attempt::Column::Id.eq(attempt_id))
            .filter(payment_attempt::Column::Status.eq(PaymentAttemptStatus::Pending))
            .exec(&*self.db)
            .await?;

        let failed = result.rows_affected == 1;
        if failed {
            PAYMENT_METRICS.attempts_failed.inc();
            info!("payment attempt marked failed");
        }
        Ok(failed)
    }

    /// Retires a pending entry whose checkout the provider reports as ended,
    /// making room for a new one. Returns false if it already left `pending`.
    pub async fn supersede<C: ConnectionTrait>(
        conn: &C,
        attempt_id: Uuid,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        let result = payment_attempt::Entity::update_many()
            .set(payment_attempt::ActiveModel {
                status: Set(PaymentAttemptStatus::Failed),
                failure_reason: Set(Some(reason.to_string())),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(payment_attempt::Column::Id.eq(attempt_id))
            .filter(payment_attempt::Column::Status.eq(PaymentAttemptStatus::Pending))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn insert_pending<C: ConnectionTrait>(
        conn: &C,
        attempt: NewAttempt,
    ) -> Result<payment_attempt::Model, sea_orm::DbErr> {
        let now = Utc::now();
        payment_attempt::ActiveModel {
            id: Set(attempt.id),
            order_id: Set(attempt.order_id),
            provider_checkout_id: Set(attempt.provider_checkout_id),
            provider_payment_id: Set(None),
            status: Set(PaymentAttemptStatus::Pending),
            amount: Set(attempt.amount),
            currency: Set(attempt.currency),
            redirect_url: Set(attempt.redirect_url),
            failure_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
        }
        .insert(conn)
        .await
    }

    /// Most recent pending entry for an order.
    pub async fn latest_pending<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<Option<payment_attempt::Model>, ServiceError> {
        Ok(payment_attempt::Entity::find()
            .filter(payment_attempt::Column::OrderId.eq(order_id))
            .filter(payment_attempt::Column::Status.eq(PaymentAttemptStatus::Pending))
            .order_by_desc(payment_attempt::Column::CreatedAt)
            .one(conn)
            .await?)
    }

    pub async fn find_by_checkout_id(
        &self,
        checkout_id: &str,
    ) -> Result<Option<payment_attempt::Model>, ServiceError> {
        Ok(payment_attempt::Entity::find()
            .filter(payment_attempt::Column::ProviderCheckoutId.eq(checkout_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn find(&self, attempt_id: Uuid) -> Result<Option<payment_attempt::Model>, ServiceError> {
        Ok(payment_attempt::Entity::find_by_id(attempt_id)
            .one(&*self.db)
            .await?)
    }

    /// All entries of an order, newest first.
    pub async fn list_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<payment_attempt::Model>, ServiceError> {
        Ok(payment_attempt::Entity::find()
            .filter(payment_attempt::Column::OrderId.eq(order_id))
            .order_by_desc(payment_attempt::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Ledger of an order, for its customer or restaurant.
    #[instrument(skip(self, user), fields(order_id = %order_id))]
    pub async fn attempts_visible_to(
        &self,
        order_id: Uuid,
        user: &AuthUser,
    ) -> Result<PaymentAttemptList, ServiceError> {
        let order = load_order(&*self.db, order_id).await?;
        ensure_order_access(&*self.db, &order, user).await?;
        let attempts = self
            .list_for_order(order_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(PaymentAttemptList { order_id, attempts })
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }
}
