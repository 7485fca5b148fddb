//! [`Cart`] read model definition.

use common::Money;

#[cfg(doc)]
use crate::domain::Cart;
use crate::domain::{product, Product};

/// Contents of a [`Cart`]: its lines with the live [`Product`]s attached.
///
/// Lines whose product vanished from the catalog entirely are filtered
/// out on load; lines whose product became inactive or outgrew the stock
/// are kept and reported via [`Contents::anomalies()`], so the caller can
/// surface them before checkout.
#[derive(Clone, Debug)]
pub struct Contents {
    /// [`Line`]s of the [`Cart`].
    pub lines: Vec<Line>,
}

/// Single line of [`Contents`].
#[derive(Clone, Debug)]
pub struct Line {
    /// Live [`Product`] this [`Line`] is for.
    pub product: Product,

    /// Number of units requested.
    pub quantity: product::Quantity,

    /// Unit price recorded when the [`Line`] was first added.
    ///
    /// Shown to the customer for comparison only; totals always use the
    /// live price.
    pub price_at_add: Money,
}

impl Contents {
    /// Returns whether the [`Cart`] holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the total number of units across all lines.
    #[must_use]
    pub fn total_items(&self) -> product::Quantity {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Computes the [`Totals`] of the [`Cart`] from the live catalog
    /// state, never from the stored price snapshots.
    #[must_use]
    pub fn totals(&self) -> Totals {
        let mut original = Money::ZERO;
        let mut subtotal = Money::ZERO;

        for line in &self.lines {
            original += line.product.unit_price.per_units(line.quantity);
            subtotal += line
                .product
                .effective_unit_price()
                .per_units(line.quantity);
        }

        Totals {
            subtotal,
            original,
            savings: original.saturating_sub(subtotal),
        }
    }

    /// Reports lines that would not survive a checkout as-is.
    #[must_use]
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.lines
            .iter()
            .filter_map(|line| {
                if !line.product.is_active {
                    Some(Anomaly::Unavailable(line.product.id))
                } else if line.quantity > line.product.quantity {
                    Some(Anomaly::ExceedsStock {
                        product_id: line.product.id,
                        available: line.product.quantity,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Monetary totals of [`Contents`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Totals {
    /// Sum of live effective prices multiplied by quantities.
    pub subtotal: Money,

    /// Sum of live list prices multiplied by quantities, ignoring
    /// discounts.
    pub original: Money,

    /// Difference between `original` and `subtotal`.
    pub savings: Money,
}

/// Detectable problem of a single cart line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Anomaly {
    /// The [`Product`] became inactive since it was added.
    Unavailable(product::Id),

    /// The requested quantity exceeds the live on-hand stock.
    ExceedsStock {
        /// ID of the short [`Product`].
        product_id: product::Id,

        /// Units actually available.
        available: product::Quantity,
    },
}
