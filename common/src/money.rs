//! [`Money`]-related definitions.

use std::{iter::Sum, ops, str::FromStr};

use derive_more::Display;
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use rust_decimal::Decimal;

use crate::Percent;

/// Amount of money in Iranian Rials.
///
/// The smallest circulating unit is 1 Rial, so an amount is always a
/// non-negative whole number, and all arithmetic stays integer arithmetic.
#[derive(
    Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Money(Decimal);

impl Money {
    /// [`Money`] amount of zero Rials.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Creates a new [`Money`] by checking the provided amount is a
    /// non-negative whole number of Rials.
    #[must_use]
    pub fn new(amount: Decimal) -> Option<Self> {
        (amount >= Decimal::ZERO && amount.is_integer())
            .then_some(Self(amount))
    }

    /// Creates a new [`Money`] without performing any validation.
    ///
    /// # Safety
    ///
    /// The provided amount must be a non-negative whole number.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates a new [`Money`] from the provided number of Rials.
    #[must_use]
    pub fn from_rials(amount: u64) -> Self {
        Self(Decimal::from(amount))
    }

    /// Returns the amount of this [`Money`] in Rials.
    #[must_use]
    pub fn amount(self) -> Decimal {
        self.0
    }

    /// Indicates whether this [`Money`] is zero Rials.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Subtracts the provided [`Money`] from this one, clamping the result
    /// at zero: a Rial amount never goes negative.
    #[must_use]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if rhs.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - rhs.0)
        }
    }

    /// Multiplies this per-unit amount by the provided number of units.
    #[must_use]
    pub fn per_units(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Returns the provided [`Percent`] share of this amount, floored to a
    /// whole number of Rials.
    #[must_use]
    pub fn percent_floor(self, percent: Percent) -> Self {
        Self((self.0 * percent.as_decimal() / Decimal::ONE_HUNDRED).floor())
    }
}

impl ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, ops::Add::add)
    }
}

impl FromStr for Money {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s)
            .ok()
            .and_then(Self::new)
            .ok_or("invalid money amount")
    }
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use rust_decimal::Decimal;

    use crate::Percent;

    use super::Money;

    #[test]
    fn from_str() {
        assert_eq!(
            Money::from_str("125000").unwrap(),
            Money::from_rials(125_000),
        );
        assert_eq!(Money::from_str("0").unwrap(), Money::ZERO);

        assert!(Money::from_str("-1").is_err());
        assert!(Money::from_str("10.5").is_err());
        assert!(Money::from_str("ten").is_err());
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        let price = Money::from_rials(90_000);

        assert_eq!(
            price.saturating_sub(Money::from_rials(40_000)),
            Money::from_rials(50_000),
        );
        assert_eq!(
            price.saturating_sub(Money::from_rials(90_000)),
            Money::ZERO,
        );
        assert_eq!(
            price.saturating_sub(Money::from_rials(100_000)),
            Money::ZERO,
        );
    }

    #[test]
    fn per_units() {
        assert_eq!(
            Money::from_rials(100_000).per_units(3),
            Money::from_rials(300_000),
        );
        assert_eq!(Money::from_rials(100_000).per_units(0), Money::ZERO);
    }

    #[test]
    fn percent_floor_rounds_down() {
        let ten = Percent::new(Decimal::from(10)).unwrap();

        assert_eq!(
            Money::from_rials(100_000).percent_floor(ten),
            Money::from_rials(10_000),
        );
        // 10% of 99 is 9.9, floored to 9 whole Rials.
        assert_eq!(
            Money::from_rials(99).percent_floor(ten),
            Money::from_rials(9),
        );
    }

    #[test]
    fn sums() {
        let total: Money = [10_u64, 20, 30]
            .into_iter()
            .map(Money::from_rials)
            .sum();

        assert_eq!(total, Money::from_rials(60));
    }
}
