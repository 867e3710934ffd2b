// Order lifecycle
pub mod order_status;
pub mod orders;
pub mod restaurants;

// Payments
pub mod checkout;
pub mod payment_ledger;
pub mod reconciliation;
pub mod webhook;
