//! [`Cart`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf, Money};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Product;
use crate::domain::{product, user};

/// Shopping cart of a [`user::User`].
///
/// Every user owns at most one [`Cart`]; it is created lazily on the first
/// add and survives checkouts (only its [`Line`]s are cleared).
#[derive(Clone, Debug)]
pub struct Cart {
    /// ID of this [`Cart`].
    pub id: Id,

    /// ID of the [`user::User`] owning this [`Cart`].
    pub user_id: user::Id,

    /// [`DateTime`] when this [`Cart`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Cart`] was last modified.
    pub updated_at: UpdateDateTime,
}

/// ID of a [`Cart`].
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
    PartialEq,
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

/// One [`Product`]'s entry in a [`Cart`].
///
/// A [`Cart`] holds at most one [`Line`] per product; adding the same
/// product again only raises the quantity.
#[derive(Clone, Debug)]
pub struct Line {
    /// ID of the [`Cart`] owning this [`Line`].
    pub cart_id: Id,

    /// ID of the [`Product`] this [`Line`] is for.
    pub product_id: product::Id,

    /// Number of units requested.
    pub quantity: product::Quantity,

    /// Unit price of the [`Product`] at the moment it was first added.
    ///
    /// Informational only: checkout always recomputes from the live
    /// catalog price, never from this snapshot.
    pub price_at_add: Money,

    /// [`DateTime`] when this [`Line`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Line`] was last modified.
    pub updated_at: UpdateDateTime,
}

/// [`DateTime`] when a [`Cart`] (or a [`Line`]) was created.
pub type CreationDateTime = DateTimeOf<(Cart, unit::Creation)>;

/// [`DateTime`] when a [`Cart`] (or a [`Line`]) was last modified.
pub type UpdateDateTime = DateTimeOf<(Cart, unit::Update)>;
