//! Money amounts and discount percentages.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a dollar value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Multiplies by a quantity, saturating at the `i64` bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Converts an amount expressed in hundredths of a cent to cents,
    /// rounding half away from zero.
    ///
    /// Discounted totals are accumulated in hundredths of a cent
    /// (`price × qty × (100 − discount)`) so the whole sum is exact and
    /// rounded exactly once.
    pub fn from_hundredths_of_cent(hundredths: i128) -> Money {
        let rounded = if hundredths >= 0 {
            (hundredths + 50) / 100
        } else {
            (hundredths - 50) / 100
        };
        Money {
            cents: rounded as i64,
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Error returned when a percentage is outside `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentOutOfRange(pub u8);

impl std::fmt::Display for PercentOutOfRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "percentage {} is outside 0..=100", self.0)
    }
}

impl std::error::Error for PercentOutOfRange {}

/// Whole-number discount percentage in `0..=100`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    /// Creates a percentage, rejecting values above 100.
    pub fn new(value: u8) -> Result<Self, PercentOutOfRange> {
        if value > 100 {
            return Err(PercentOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// No discount.
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// The share of the price the buyer still pays, in percent.
    pub fn remaining(&self) -> u8 {
        100 - self.0
    }
}

impl TryFrom<u8> for Percent {
    type Error = PercentOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for u8 {
    fn from(p: Percent) -> Self {
        p.0
    }
}

impl std::fmt::Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_money_multiply_and_sum() {
        let total: Money = [Money::from_cents(1000).multiply(3), Money::from_cents(250)]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 3250);
    }

    #[test]
    fn test_money_arithmetic_saturates() {
        let huge = Money::from_cents(i64::MAX / 2);
        assert_eq!(huge.multiply(u32::MAX).cents(), i64::MAX);
        assert_eq!((huge.multiply(3) + Money::from_cents(1)).cents(), i64::MAX);
    }

    #[test]
    fn test_hundredths_rounding_is_half_up() {
        assert_eq!(Money::from_hundredths_of_cent(180_000).cents(), 1800);
        assert_eq!(Money::from_hundredths_of_cent(149).cents(), 1);
        assert_eq!(Money::from_hundredths_of_cent(150).cents(), 2);
        assert_eq!(Money::from_hundredths_of_cent(-150).cents(), -2);
    }

    #[test]
    fn test_percent_bounds() {
        assert!(Percent::new(0).is_ok());
        assert_eq!(Percent::new(100).unwrap().remaining(), 0);
        assert_eq!(Percent::new(101), Err(PercentOutOfRange(101)));
    }

    #[test]
    fn test_percent_deserialization_validates() {
        let ok: Percent = serde_json::from_str("15").unwrap();
        assert_eq!(ok.value(), 15);
        assert!(serde_json::from_str::<Percent>("250").is_err());
    }
}
