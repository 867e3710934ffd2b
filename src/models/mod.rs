//! Domain value types shared by entities, services and handlers.

pub mod money;
pub mod order_status;
pub mod payment;

pub use money::{to_minor_units, MoneyError};
pub use order_status::{ActorRole, OrderStatus, OrderType, TransitionError};
pub use payment::{
    is_accepted_provider_status, is_closed_provider_status, ConfirmationSource,
    PaymentAttemptStatus, PaymentMethod,
};
