use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Decimal places carried by every supported currency.
pub const CURRENCY_SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("amount must be positive, got {0}")]
    NotPositive(Decimal),
    #[error("amount {0} has more than {CURRENCY_SCALE} decimal places")]
    TooPrecise(Decimal),
    #[error("amount {0} is out of range")]
    OutOfRange(Decimal),
}

/// Converts a currency amount to integer minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::NotPositive(amount));
    }
    if amount.normalize().scale() > CURRENCY_SCALE {
        return Err(MoneyError::TooPrecise(amount));
    }
    amount
        .checked_mul(Decimal::from(100))
        .and_then(|cents| cents.to_i64())
        .ok_or(MoneyError::OutOfRange(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_rand_amounts_to_cents() {
        assert_eq!(to_minor_units(dec!(150.00)), Ok(15000));
        assert_eq!(to_minor_units(dec!(150)), Ok(15000));
        assert_eq!(to_minor_units(dec!(0.01)), Ok(1));
        assert_eq!(to_minor_units(dec!(89.9)), Ok(8990));
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        assert_eq!(to_minor_units(dec!(12.5000)), Ok(1250));
    }

    #[test]
    fn oversized_amounts_are_out_of_range() {
        assert_eq!(
            to_minor_units(Decimal::MAX),
            Err(MoneyError::OutOfRange(Decimal::MAX))
        );
        let beyond_i64 = Decimal::from(i64::MAX);
        assert_eq!(
            to_minor_units(beyond_i64),
            Err(MoneyError::OutOfRange(beyond_i64))
        );
    }

    #[test]
    fn rejects_non_positive_and_fractional_cents() {
        assert_eq!(
            to_minor_units(dec!(0)),
            Err(MoneyError::NotPositive(dec!(0)))
        );
        assert!(matches!(
            to_minor_units(dec!(-5.00)),
            Err(MoneyError::NotPositive(_))
        ));
        assert!(matches!(
            to_minor_units(dec!(10.005)),
            Err(MoneyError::TooPrecise(_))
        ));
    }
}
