//! Money in integer cents.
//!
//! The payments platform charges in the currency's smallest unit, so every
//! amount in Bakehouse is kept as whole cents. Catalog prices arrive as
//! decimal dollars and are converted once, at the settings boundary.

use core::fmt;
use core::iter::Sum;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors converting or combining money amounts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    /// Amount was negative.
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    /// Amount has fractions of a cent.
    #[error("amount has fractional cents: {0}")]
    FractionalCents(Decimal),
    /// Arithmetic overflowed.
    #[error("amount overflow")]
    Overflow,
}

/// A non-negative amount in cents.
///
/// ```
/// use bakehouse_core::Cents;
/// use rust_decimal::Decimal;
///
/// let price = Cents::from_dollars(Decimal::new(600, 2)).unwrap();
/// assert_eq!(price, Cents::new(600));
/// assert_eq!(price.to_string(), "$6.00");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(u64);

impl Cents {
    /// Zero cents.
    pub const ZERO: Self = Self(0);

    /// Create an amount from whole cents.
    #[must_use]
    pub const fn new(cents: u64) -> Self {
        Self(cents)
    }

    /// Whole cents.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Convert a decimal dollar amount (e.g. `6.50`) to cents.
    ///
    /// # Errors
    ///
    /// Returns an error for negative amounts, sub-cent precision, or values
    /// that do not fit in `u64` cents.
    pub fn from_dollars(dollars: Decimal) -> Result<Self, MoneyError> {
        if dollars.is_sign_negative() && !dollars.is_zero() {
            return Err(MoneyError::Negative(dollars));
        }
        let cents = dollars
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?;
        if cents.fract() != Decimal::ZERO {
            return Err(MoneyError::FractionalCents(dollars));
        }
        cents.to_u64().map(Self).ok_or(MoneyError::Overflow)
    }

    /// The amount as decimal dollars.
    #[must_use]
    pub fn to_dollars(self) -> Decimal {
        Decimal::from(self.0) / Decimal::ONE_HUNDRED
    }

    /// Multiply by a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the product does not fit.
    pub fn checked_mul(self, quantity: u32) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(u64::from(quantity))
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Add two amounts.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the sum does not fit.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Sum amounts, failing on overflow.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the total does not fit.
    pub fn checked_sum<I>(amounts: I) -> Result<Self, MoneyError>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, next| acc.checked_add(next))
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|c| c.0).sum())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dollars() {
        assert_eq!(Cents::from_dollars(Decimal::new(12, 0)).unwrap(), Cents::new(1200));
        assert_eq!(Cents::from_dollars(Decimal::new(650, 2)).unwrap(), Cents::new(650));
        assert_eq!(Cents::from_dollars(Decimal::ZERO).unwrap(), Cents::ZERO);
    }

    #[test]
    fn test_from_dollars_rejects_bad_amounts() {
        assert!(matches!(
            Cents::from_dollars(Decimal::new(-1, 0)),
            Err(MoneyError::Negative(_))
        ));
        assert!(matches!(
            Cents::from_dollars(Decimal::new(1005, 3)),
            Err(MoneyError::FractionalCents(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Cents::new(1200).to_string(), "$12.00");
        assert_eq!(Cents::new(5).to_string(), "$0.05");
        assert_eq!(Cents::new(123_456).to_string(), "$1234.56");
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(Cents::new(600).checked_mul(3).unwrap(), Cents::new(1800));
        assert_eq!(Cents::new(u64::MAX).checked_mul(2), Err(MoneyError::Overflow));
        assert_eq!(
            Cents::checked_sum([Cents::new(100), Cents::new(250)]).unwrap(),
            Cents::new(350)
        );
    }

    #[test]
    fn test_to_dollars() {
        assert_eq!(Cents::new(650).to_dollars(), Decimal::new(650, 2));
    }
}
