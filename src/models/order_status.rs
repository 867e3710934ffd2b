use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "preparing")]
    Preparing,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "out_for_delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// How the customer receives the order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderType {
    #[sea_orm(string_value = "delivery")]
    Delivery,
    #[sea_orm(string_value = "collection")]
    Collection,
}

/// The party asking for a status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ActorRole {
    Customer,
    Restaurant,
    System,
}

/// Why a requested transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move order from '{from}' to '{to}'")]
    Invalid { from: OrderStatus, to: OrderStatus },
    #[error("{role} may not move order from '{from}' to '{to}'")]
    NotPermitted {
        role: ActorRole,
        from: OrderStatus,
        to: OrderStatus,
    },
}

struct Transition {
    from: OrderStatus,
    to: OrderStatus,
    actors: &'static [ActorRole],
    /// `None` applies to every order type.
    only_for: Option<OrderType>,
}

const RESTAURANT: &[ActorRole] = &[ActorRole::Restaurant];
const RESTAURANT_OR_CUSTOMER: &[ActorRole] = &[ActorRole::Restaurant, ActorRole::Customer];

/// Every legal edge of the order lifecycle. Anything not listed is rejected.
const TRANSITIONS: &[Transition] = &[
    Transition {
        from: OrderStatus::Pending,
        to: OrderStatus::Confirmed,
        actors: RESTAURANT,
        only_for: None,
    },
    Transition {
        from: OrderStatus::Pending,
        to: OrderStatus::Cancelled,
        actors: RESTAURANT_OR_CUSTOMER,
        only_for: None,
    },
    Transition {
        from: OrderStatus::Confirmed,
        to: OrderStatus::Preparing,
        actors: RESTAURANT,
        only_for: None,
    },
    Transition {
        from: OrderStatus::Confirmed,
        to: OrderStatus::Cancelled,
        actors: RESTAURANT,
        only_for: None,
    },
    Transition {
        from: OrderStatus::Preparing,
        to: OrderStatus::Ready,
        actors: RESTAURANT,
        only_for: None,
    },
    Transition {
        from: OrderStatus::Preparing,
        to: OrderStatus::Cancelled,
        actors: RESTAURANT,
        only_for: None,
    },
    Transition {
        from: OrderStatus::Ready,
        to: OrderStatus::OutForDelivery,
        actors: RESTAURANT,
        only_for: Some(OrderType::Delivery),
    },
    Transition {
        from: OrderStatus::Ready,
        to: OrderStatus::Delivered,
        actors: RESTAURANT,
        only_for: Some(OrderType::Collection),
    },
    Transition {
        from: OrderStatus::Ready,
        to: OrderStatus::Cancelled,
        actors: RESTAURANT,
        only_for: None,
    },
    Transition {
        from: OrderStatus::OutForDelivery,
        to: OrderStatus::Delivered,
        actors: RESTAURANT,
        only_for: Some(OrderType::Delivery),
    },
    Transition {
        from: OrderStatus::OutForDelivery,
        to: OrderStatus::Cancelled,
        actors: RESTAURANT,
        only_for: None,
    },
];

impl OrderStatus {
    /// Statuses that may only be reached once payment has been confirmed.
    pub fn requires_confirmed_payment(self) -> bool {
        matches!(
            self,
            OrderStatus::Preparing
                | OrderStatus::Ready
                | OrderStatus::OutForDelivery
                | OrderStatus::Delivered
        )
    }

    /// Checks a transition against the lifecycle table, the actor rules and
    /// the payment gate.
    pub fn validate_transition(
        self,
        to: OrderStatus,
        order_type: OrderType,
        role: ActorRole,
        payment_confirmed: bool,
    ) -> Result<(), TransitionError> {
        let edge = TRANSITIONS
            .iter()
            .find(|t| {
                t.from == self
                    && t.to == to
                    && t.only_for.map_or(true, |only| only == order_type)
            })
            .ok_or(TransitionError::Invalid { from: self, to })?;

        if !edge.actors.contains(&role) {
            return Err(TransitionError::NotPermitted {
                role,
                from: self,
                to,
            });
        }

        if to.requires_confirmed_payment() && !payment_confirmed {
            return Err(TransitionError::Invalid { from: self, to });
        }

        Ok(())
    }
}
