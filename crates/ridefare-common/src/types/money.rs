//! Monetary rounding
//!
//! Fares are quantised to cents with ties rounded away from zero, so an exact
//! `x.xx5` always rounds up in magnitude.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ValidationError;

/// Decimal places kept on every monetary output
pub const MONEY_DP: u32 = 2;

/// Round to cents, half away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a float to Decimal, mapping non-finite input to zero.
///
/// Only for factors that degrade to a neutral value; quantities that end up
/// in a charge go through [`try_decimal_from_f64`].
pub fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Convert a float feeding a charge, rejecting what Decimal cannot hold
pub fn try_decimal_from_f64(value: f64, field: &'static str) -> Result<Decimal, ValidationError> {
    Decimal::from_f64(value).ok_or_else(|| ValidationError::OutOfRange {
        field,
        reason: format!("{value} is not representable"),
    })
}

/// Lossy conversion used for float-only math such as surge factors
pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
