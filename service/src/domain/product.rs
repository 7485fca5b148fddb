//! [`Product`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf, Money, Percent};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pricing::{self, Discount};

/// Pharmacy catalog product.
///
/// The product row is the authority on live price, discount and on-hand
/// stock. Orders never reference these fields directly: they snapshot them
/// at assembly time.
#[derive(Clone, Debug)]
pub struct Product {
    /// ID of this [`Product`].
    pub id: Id,

    /// [`Name`] of this [`Product`].
    pub name: Name,

    /// [`Sku`] of this [`Product`].
    pub sku: Sku,

    /// [`Slug`] of this [`Product`].
    pub slug: Slug,

    /// Price of a single unit, before any discount.
    pub unit_price: Money,

    /// On-hand [`Quantity`] of this [`Product`].
    pub quantity: Quantity,

    /// [`Quantity`] at (or below) which the stock is considered low.
    pub reorder_level: Quantity,

    /// Indicator whether this [`Product`] is sellable at all.
    pub is_active: bool,

    /// Percentage off the unit price.
    pub discount_percent: Percent,

    /// Flat amount off each unit, in Rials.
    pub discount_per_unit: Money,

    /// [`DateTime`] when this [`Product`] was created.
    pub created_at: CreationDateTime,
}

impl Product {
    /// Returns the [`Discount`] attached to this [`Product`].
    #[must_use]
    pub fn discount(&self) -> Discount {
        Discount {
            percent: self.discount_percent,
            per_unit: self.discount_per_unit,
        }
    }

    /// Returns whether any discount applies to this [`Product`].
    #[must_use]
    pub fn has_discount(&self) -> bool {
        !self.discount().is_none()
    }

    /// Returns the unit price of this [`Product`] after its [`Discount`].
    #[must_use]
    pub fn effective_unit_price(&self) -> Money {
        pricing::effective_unit_price(self.unit_price, &self.discount())
    }

    /// Returns whether this [`Product`] can be put into a cart.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.is_active && self.quantity > 0
    }

    /// Returns whether the on-hand stock reached the reorder level.
    #[must_use]
    pub fn low_stock(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

/// ID of a [`Product`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Name of a [`Product`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Name(String);

impl Name {
    /// Creates a new [`Name`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `name` is not empty.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a new [`Name`] if the given `name` is valid.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        Self::check(&name).then_some(Self(name))
    }

    /// Checks whether the given `name` is a valid [`Name`].
    fn check(name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        name.trim() == name && !name.is_empty() && name.len() <= 100
    }
}

impl FromStr for Name {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Name`")
    }
}

/// Stock-keeping unit code of a [`Product`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Sku(String);

impl Sku {
    /// Creates a new [`Sku`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `sku` matches the format.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(sku: impl Into<String>) -> Self {
        Self(sku.into())
    }

    /// Creates a new [`Sku`] if the given `sku` is valid.
    #[must_use]
    pub fn new(sku: impl Into<String>) -> Option<Self> {
        let sku = sku.into();
        Self::check(&sku).then_some(Self(sku))
    }

    /// Checks whether the given `sku` is a valid [`Sku`].
    fn check(sku: impl AsRef<str>) -> bool {
        let sku = sku.as_ref();
        sku.trim() == sku && !sku.is_empty() && sku.len() <= 50
    }
}

impl FromStr for Sku {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Sku`")
    }
}

/// URL slug of a [`Product`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Slug(String);

impl Slug {
    /// Creates a new [`Slug`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `slug` matches the format.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    /// Creates a new [`Slug`] if the given `slug` is valid.
    #[must_use]
    pub fn new(slug: impl Into<String>) -> Option<Self> {
        let slug = slug.into();
        Self::check(&slug).then_some(Self(slug))
    }

    /// Checks whether the given `slug` is a valid [`Slug`].
    fn check(slug: impl AsRef<str>) -> bool {
        let slug = slug.as_ref();
        !slug.is_empty()
            && slug.len() <= 50
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }
}

impl FromStr for Slug {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Slug`")
    }
}

/// Count of [`Product`] units.
pub type Quantity = u32;

/// [`DateTime`] when a [`Product`] was created.
pub type CreationDateTime = DateTimeOf<(Product, unit::Creation)>;
