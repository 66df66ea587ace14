//! Decimal money helpers.
//!
//! All monetary values are `rust_decimal::Decimal`. Rounding is always to two
//! places, half away from zero, and happens only where a business rule says so.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Number of decimal places money is rounded to.
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to cents.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A percentage expressed in points (`Percent::new(7)` is 7%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(points: impl Into<Decimal>) -> Self {
        Self(points.into())
    }

    pub fn points(&self) -> Decimal {
        self.0
    }

    /// Exact (unrounded) share of `amount`.
    pub fn of(&self, amount: Decimal) -> Decimal {
        amount * self.0 / Decimal::ONE_HUNDRED
    }

    /// Share of `amount`, rounded to cents.
    pub fn rounded_of(&self, amount: Decimal) -> Decimal {
        round_money(self.of(amount))
    }

    pub fn half(&self) -> Self {
        Self(self.0 / Decimal::TWO)
    }
}

impl ValueObject for Percent {}

impl core::fmt::Display for Percent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(d("1.005")), d("1.01"));
        assert_eq!(round_money(d("-1.005")), d("-1.01"));
        assert_eq!(round_money(d("2.344")), d("2.34"));
    }

    #[test]
    fn percent_of_amount() {
        let tax = Percent::new(7);
        assert_eq!(tax.rounded_of(d("3600")), d("252.00"));
        assert_eq!(Percent::new(d("3.8")).rounded_of(d("1000")), d("38.00"));
        assert_eq!(Percent::new(3).half().points(), d("1.5"));
        assert_eq!(Percent::new(d("3.80")).to_string(), "3.8%");
    }
}
