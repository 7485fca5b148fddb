//! Pure price and discount calculations.
//!
//! Everything here is deterministic integer arithmetic over whole-Rial
//! [`Money`] amounts; rounding is always a floor.

use std::cmp;

use common::{Money, Percent};
use smart_default::SmartDefault;

#[cfg(doc)]
use crate::domain::Product;
use crate::domain::product;

/// Discount attached to a [`Product`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Discount {
    /// Percentage off the unit price, applied first.
    pub percent: Percent,

    /// Flat amount off each unit, in Rials.
    pub per_unit: Money,
}

impl Discount {
    /// Returns whether this [`Discount`] changes nothing.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.percent.is_zero() && self.per_unit.is_zero()
    }
}

/// Monetary totals of a single order (or cart) line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineTotals {
    /// Undiscounted amount: unit price multiplied by quantity.
    pub subtotal: Money,

    /// Total discount taken off this line.
    pub discount: Money,

    /// Amount actually payable: `subtotal` minus `discount`.
    pub total: Money,
}

/// Unit price of a [`Product`] after applying the provided [`Discount`]:
/// the percentage is taken off first (floored to whole Rials), then the
/// flat per-unit amount is subtracted, and the result is clamped at zero.
#[must_use]
pub fn effective_unit_price(unit_price: Money, discount: &Discount) -> Money {
    unit_price
        .percent_floor(discount.percent.complement())
        .saturating_sub(discount.per_unit)
}

/// Computes the [`LineTotals`] of `quantity` units priced at `unit_price`
/// under the provided [`Discount`].
///
/// The per-unit discount is the larger of the percentage-derived and the
/// flat amount (they are alternatives, not additive), and never exceeds
/// the unit price itself.
#[must_use]
pub fn line_totals(
    unit_price: Money,
    quantity: product::Quantity,
    discount: &Discount,
) -> LineTotals {
    let per_unit_off = cmp::min(
        unit_price,
        cmp::max(
            unit_price.percent_floor(discount.percent),
            discount.per_unit,
        ),
    );

    let subtotal = unit_price.per_units(quantity);
    let discount = per_unit_off.per_units(quantity);

    LineTotals {
        subtotal,
        discount,
        total: subtotal.saturating_sub(discount),
    }
}

/// Flat-threshold shipping rule.
#[derive(Clone, Copy, Debug, SmartDefault)]
pub struct ShippingConfig {
    /// Order subtotal starting from which shipping is free.
    #[default(Money::from_rials(500_000))]
    pub free_threshold: Money,

    /// Flat fee charged below the threshold.
    #[default(Money::from_rials(25_000))]
    pub fee: Money,
}

/// Shipping cost of an order with the provided (undiscounted) subtotal.
#[must_use]
pub fn order_shipping_cost(config: &ShippingConfig, subtotal: Money) -> Money {
    if subtotal >= config.free_threshold {
        Money::ZERO
    } else {
        config.fee
    }
}
