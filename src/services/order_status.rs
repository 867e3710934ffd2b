use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::order,
    errors::ServiceError,
    metrics::ORDER_METRICS,
    models::{ConfirmationSource, OrderStatus, PaymentMethod, TransitionError},
    services::{
        orders::{ensure_order_access, load_order, order_response, OrderResponse},
        payment_ledger::PaymentLedger,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SelectPaymentMethodRequest {
    pub payment_method: PaymentMethod,
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Invalid { from, to } => ServiceError::InvalidTransition { from, to },
            not_permitted @ TransitionError::NotPermitted { .. } => {
                ServiceError::Forbidden(not_permitted.to_string())
            }
        }
    }
}

/// Applies lifecycle transitions and payment-method selection.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    ledger: PaymentLedger,
}

impl OrderStatusService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self {
            ledger: PaymentLedger::new(db.clone()),
            db,
        }
    }

    /// Moves an order to `new_status`. The write is conditional on the
    /// status that was validated, so a stale client loses with `Conflict`
    /// instead of overwriting a newer status.
    #[instrument(skip(self, user), fields(order_id = %order_id, new_status = %new_status, role = %user.role))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        user: &AuthUser,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db;
        let order = load_order(db, order_id).await?;
        ensure_order_access(db, &order, user).await?;

        let old_status = order.status;
        if let Err(err) = old_status.validate_transition(
            new_status,
            order.order_type,
            user.actor_role(),
            order.payment_confirmed,
        ) {
            warn!(from = %old_status, error = %err, "order transition rejected");
            return Err(err.into());
        }

        let result = order::Entity::update_many()
            .set(order::ActiveModel {
                status: Set(new_status),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(old_status))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            ORDER_METRICS.status_conflicts.inc();
            let current = load_order(db, order_id).await?;
            warn!(expected = %old_status, actual = %current.status, "order status changed concurrently");
            return Err(ServiceError::Conflict(format!(
                "order {} is now '{}'",
                order_id, current.status
            )));
        }

        match new_status {
            OrderStatus::Cancelled => {
                ORDER_METRICS.orders_cancelled.inc();
                if order.payment_confirmed && order.payment_method == Some(PaymentMethod::Online) {
                    warn!("paid order cancelled; online payment needs a refund");
                }
            }
            OrderStatus::Delivered => ORDER_METRICS.orders_delivered.inc(),
            _ => {}
        }
        info!(from = %old_status, to = %new_status, "order status updated");

        order_response(db, load_order(db, order_id).await?).await
    }

    /// Customer picks how to pay a confirmed order. `online` only records the
    /// choice; `cash` confirms payment immediately without a ledger entry.
    #[instrument(skip(self, user), fields(order_id = %order_id, method = %method))]
    pub async fn select_payment_method(
        &self,
        order_id: Uuid,
        user: &AuthUser,
        method: PaymentMethod,
    ) -> Result<OrderResponse, ServiceError> {
        user.require_customer()?;
        let db = &*self.db;
        let order = load_order(db, order_id).await?;
        ensure_order_access(db, &order, user).await?;
        ensure_awaiting_payment(&order)?;

        match method {
            PaymentMethod::Online => {
                let result = order::Entity::update_many()
                    .set(order::ActiveModel {
                        payment_method: Set(Some(PaymentMethod::Online)),
                        updated_at: Set(Utc::now()),
                        ..Default::default()
                    })
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(OrderStatus::Confirmed))
                    .filter(order::Column::PaymentConfirmed.eq(false))
                    .exec(db)
                    .await?;
                if result.rows_affected == 0 {
                    ensure_awaiting_payment(&load_order(db, order_id).await?)?;
                }
                info!("online payment selected");
            }
            PaymentMethod::Cash => {
                let outcome = self
                    .ledger
                    .confirm(order_id, ConfirmationSource::Cash, None)
                    .await?;
                info!(%outcome, "cash payment selected");
            }
        }

        order_response(db, load_order(db, order_id).await?).await
    }
}

/// Payment can only be arranged once the restaurant accepted the order and
/// before anyone has paid for it.
pub fn ensure_awaiting_payment(order: &order::Model) -> Result<(), ServiceError> {
    if order.status != OrderStatus::Confirmed {
        return Err(ServiceError::InvalidOperation(format!(
            "order is '{}'; payment is only possible once the restaurant has confirmed it",
            order.status
        )));
    }
    if order.payment_confirmed {
        return Err(ServiceError::InvalidOperation(
            "order has already been paid".to_string(),
        ));
    }
    Ok(())
}
