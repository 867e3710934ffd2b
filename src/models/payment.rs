use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How the customer settles the order.
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
pub enum PaymentMethod {
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "online")]
    Online,
}

/// Status of a ledger entry. `Completed` and `Failed` are terminal.
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
pub enum PaymentAttemptStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Channel through which a payment confirmation arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmationSource {
    Webhook,
    Poll,
    Cash,
}

impl ConfirmationSource {
    pub fn payment_method(self) -> PaymentMethod {
        match self {
            ConfirmationSource::Webhook | ConfirmationSource::Poll => PaymentMethod::Online,
            ConfirmationSource::Cash => PaymentMethod::Cash,
        }
    }
}

/// Provider statuses treated as a successful payment (compared case-insensitively).
pub const ACCEPTED_PROVIDER_STATUSES: &[&str] = &["approved", "succeeded", "completed", "successful"];

pub fn is_accepted_provider_status(status: &str) -> bool {
    let status = status.trim();
    ACCEPTED_PROVIDER_STATUSES
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(status))
}

/// Provider statuses meaning the checkout ended without a payment.
pub const CLOSED_PROVIDER_STATUSES: &[&str] =
    &["failed", "cancelled", "canceled", "expired", "declined", "abandoned"];

pub fn is_closed_provider_status(status: &str) -> bool {
    let status = status.trim();
    CLOSED_PROVIDER_STATUSES
        .iter()
        .any(|closed| closed.eq_ignore_ascii_case(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_statuses_ignore_case() {
        assert!(is_accepted_provider_status("APPROVED"));
        assert!(is_accepted_provider_status("Succeeded"));
        assert!(is_accepted_provider_status(" completed "));
        assert!(is_accepted_provider_status("successful"));
        assert!(!is_accepted_provider_status("pending"));
        assert!(!is_accepted_provider_status("started"));
        assert!(!is_accepted_provider_status(""));
    }

    #[test]
    fn closed_statuses_are_distinct_from_open_ones() {
        assert!(is_closed_provider_status("Expired"));
        assert!(is_closed_provider_status("cancelled"));
        assert!(is_closed_provider_status("FAILED"));
        assert!(!is_closed_provider_status("started"));
        assert!(!is_closed_provider_status("processing"));
        assert!(!is_closed_provider_status("completed"));
    }

    #[test]
    fn cash_confirmation_maps_to_cash_method() {
        assert_eq!(ConfirmationSource::Cash.payment_method(), PaymentMethod::Cash);
        assert_eq!(ConfirmationSource::Poll.payment_method(), PaymentMethod::Online);
        assert_eq!(
            ConfirmationSource::Webhook.payment_method(),
            PaymentMethod::Online
        );
    }
}
