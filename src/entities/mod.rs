pub mod order;
pub mod order_item;
pub mod payment_attempt;
pub mod processed_webhook_event;
pub mod restaurant;
pub mod restaurant_payment_credentials;
