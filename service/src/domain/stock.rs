//! Stock [`Movement`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Product;
use crate::domain::{product, user};

/// Single change of a [`Product`]'s on-hand quantity.
///
/// [`Movement`]s form an append-only audit trail: they are never updated or
/// deleted, and the `before_quantity`/`after_quantity` pair pins the exact
/// stock level the change was applied to.
#[derive(Clone, Debug)]
pub struct Movement {
    /// ID of this [`Movement`].
    pub id: Id,

    /// ID of the [`Product`] whose stock changed.
    pub product_id: product::Id,

    /// [`Kind`] of this [`Movement`].
    pub kind: Kind,

    /// Signed change of the on-hand quantity.
    pub quantity: i32,

    /// On-hand quantity right before this [`Movement`].
    pub before_quantity: product::Quantity,

    /// On-hand quantity right after this [`Movement`].
    pub after_quantity: product::Quantity,

    /// Optional [`Note`] describing this [`Movement`].
    pub note: Option<Note>,

    /// ID of the [`user::User`] who caused this [`Movement`], if known.
    pub created_by: Option<user::Id>,

    /// [`DateTime`] when this [`Movement`] happened.
    pub created_at: CreationDateTime,
}

/// ID of a [`Movement`].
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

define_kind! {
    #[doc = "Kind of a stock [`Movement`]."]
    enum Kind {
        #[doc = "Units bought in from a supplier."]
        Purchase = 1,

        #[doc = "Units sold to a customer."]
        Sale = 2,

        #[doc = "Units returned to stock (returned or cancelled orders)."]
        Return = 3,

        #[doc = "Manual correction of the on-hand quantity."]
        Adjustment = 4,

        #[doc = "Units written off (expiry, damage)."]
        Loss = 5,
    }
}

/// Free-text note attached to a [`Movement`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Note(String);

impl Note {
    /// Creates a new [`Note`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `note` is not empty.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(note: impl Into<String>) -> Self {
        Self(note.into())
    }

    /// Creates a new [`Note`] if the given `note` is valid.
    #[must_use]
    pub fn new(note: impl Into<String>) -> Option<Self> {
        let note = note.into();
        Self::check(&note).then_some(Self(note))
    }

    /// Checks whether the given `note` is a valid [`Note`].
    fn check(note: impl AsRef<str>) -> bool {
        let note = note.as_ref();
        note.trim() == note && !note.is_empty() && note.len() <= 512
    }
}

impl FromStr for Note {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Note`")
    }
}

/// [`DateTime`] when a [`Movement`] happened.
pub type CreationDateTime = DateTimeOf<(Movement, unit::Creation)>;
