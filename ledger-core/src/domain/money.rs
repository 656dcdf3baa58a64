//! Monetary arithmetic over `Decimal`
//!
//! Amounts and balances are persisted as `DECIMAL(38, 10)`, so every value the
//! ledger accepts must fit that column: at most `MAX_SCALE` fractional digits
//! and a magnitude strictly below `10^28`. Arithmetic never rounds or wraps;
//! anything that would is rejected as an invalid argument.

use rust_decimal::Decimal;

use super::result::{Error, Result};

/// Maximum number of fractional digits stored for an amount or balance
pub const MAX_SCALE: u32 = 10;

/// Exclusive upper bound on the magnitude of any stored value (10^28)
pub fn max_magnitude() -> Decimal {
    Decimal::from_i128_with_scale(10_i128.pow(28), 0)
}

fn check_representable(value: Decimal, what: &str) -> Result<()> {
    if value.normalize().scale() > MAX_SCALE {
        return Err(Error::invalid_argument(format!(
            "{} {} has more than {} decimal places",
            what, value, MAX_SCALE
        )));
    }
    if value.abs() >= max_magnitude() {
        return Err(Error::invalid_argument(format!(
            "{} {} exceeds the supported range",
            what, value
        )));
    }
    Ok(())
}

/// Validate a transfer amount: strictly positive and representable
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::invalid_argument(format!(
            "amount must be greater than zero, got {}",
            amount
        )));
    }
    check_representable(amount, "amount")
}

/// Validate an account balance: non-negative and representable
pub fn validate_balance(balance: Decimal) -> Result<()> {
    if balance.is_sign_negative() && !balance.is_zero() {
        return Err(Error::invalid_argument(format!(
            "balance must not be negative, got {}",
            balance
        )));
    }
    check_representable(balance, "balance")
}

/// Subtract `amount` from `balance`
///
/// Callers check sufficiency first; a negative result is still refused here.
pub fn checked_debit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    let result = balance
        .checked_sub(amount)
        .ok_or_else(|| Error::invalid_argument("debit overflows the amount type"))?;
    if result < Decimal::ZERO {
        return Err(Error::invalid_argument(format!(
            "debit of {} from {} would go negative",
            amount, balance
        )));
    }
    Ok(result.normalize())
}

/// Add `amount` to `balance`, refusing overflow and silent rounding
pub fn checked_credit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    let result = balance
        .checked_add(amount)
        .ok_or_else(|| Error::invalid_argument("credit overflows the amount type"))?;
    // Decimal drops fractional digits instead of failing when the mantissa is full
    if result - amount != balance {
        return Err(Error::invalid_argument(format!(
            "credit of {} to {} cannot be represented exactly",
            amount, balance
        )));
    }
    check_representable(result, "resulting balance")?;
    Ok(result.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(dec!(0.01)).is_ok());
        assert!(matches!(validate_amount(dec!(0)), Err(Error::InvalidArgument(_))));
        assert!(matches!(validate_amount(dec!(-5)), Err(Error::InvalidArgument(_))));
        // 11 fractional digits do not fit the stored column
        assert!(matches!(
            validate_amount(dec!(0.00000000001)),
            Err(Error::InvalidArgument(_))
        ));
        // trailing zeros beyond the scale are fine
        assert!(validate_amount(dec!(1.000000000000)).is_ok());
    }

    #[test]
    fn test_validate_balance_allows_zero() {
        assert!(validate_balance(dec!(0)).is_ok());
        assert!(validate_balance(dec!(-0.0)).is_ok());
        assert!(validate_balance(dec!(-0.01)).is_err());
        assert!(validate_balance(max_magnitude()).is_err());
    }

    #[test]
    fn test_checked_debit_to_zero() {
        assert_eq!(checked_debit(dec!(100.0), dec!(100.0)).unwrap(), dec!(0));
        assert!(checked_debit(dec!(1), dec!(2)).is_err());
    }

    #[test]
    fn test_checked_credit_rejects_out_of_range() {
        assert_eq!(checked_credit(dec!(1.5), dec!(2.25)).unwrap(), dec!(3.75));

        let near_max = max_magnitude() - dec!(1);
        assert!(matches!(
            checked_credit(near_max, dec!(1)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            checked_credit(Decimal::MAX, dec!(1)),
            Err(Error::InvalidArgument(_))
        ));
    }
}
