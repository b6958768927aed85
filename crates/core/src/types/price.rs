//! Unit price using decimal arithmetic.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monetary amount in the store's currency.
///
/// Wraps [`Decimal`] so cart totals never accumulate floating point error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from an integer number of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        assert_eq!(Price::from_cents(1999).amount(), Decimal::new(1999, 2));
        assert_eq!(Price::from_cents(-50).amount(), Decimal::new(-50, 2));
    }

    #[test]
    fn test_times_and_sum_are_exact() {
        let tenth = Price::new(Decimal::new(1, 1));
        let total: Price = std::iter::repeat_n(tenth, 3).sum();
        assert_eq!(total, Price::new(Decimal::new(3, 1)));
        assert_eq!(tenth.times(3), total);
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_cents(2500).to_string(), "$25.00");
    }

    #[test]
    fn test_deserializes_from_string_or_number() {
        let p: Price = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(p, Price::from_cents(1250));
        let p: Price = serde_json::from_str("12.5").unwrap();
        assert_eq!(p, Price::from_cents(1250));
    }
}
