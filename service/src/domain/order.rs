//! [`Order`] definitions.

use std::{sync::LazyLock, time::Duration};

use common::{define_kind, unit, DateTime, DateTimeOf, Money, Percent};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::{Cart, Product};
use crate::domain::{product, user};

/// Customer order.
///
/// An [`Order`] is assembled from a [`Cart`] in a single transaction and is
/// immutable afterwards, except for its statuses, payment fields and stage
/// timestamps. All monetary amounts and the shipping address are snapshots
/// taken at assembly time.
#[derive(Clone, Debug)]
pub struct Order {
    /// ID of this [`Order`].
    pub id: Id,

    /// Human-facing [`Number`] of this [`Order`].
    pub number: Number,

    /// ID of the [`user::User`] who placed this [`Order`].
    pub user_id: user::Id,

    /// Fulfilment [`Status`] of this [`Order`].
    pub status: Status,

    /// [`PaymentStatus`] of this [`Order`].
    pub payment_status: PaymentStatus,

    /// Sum of the undiscounted [`Item`] subtotals.
    pub subtotal: Money,

    /// Sum of the [`Item`] discounts.
    pub discount_amount: Money,

    /// Shipping cost charged on this [`Order`].
    pub shipping_cost: Money,

    /// Final payable amount:
    /// `subtotal - discount_amount + shipping_cost`.
    pub total_amount: Money,

    /// [`ShippingAddress`] snapshot of this [`Order`].
    pub shipping_address: ShippingAddress,

    /// Name of the customer at the moment of ordering.
    pub customer_name: CustomerName,

    /// Phone number of the customer at the moment of ordering.
    pub customer_phone: user::Phone,

    /// Optional [`Note`] left by the customer.
    pub customer_note: Option<Note>,

    /// Payment gateway authority code, once payment was attempted.
    pub payment_authority: Option<PaymentAuthority>,

    /// Payment gateway reference ID, once payment succeeded.
    pub payment_ref_id: Option<PaymentRefId>,

    /// [`DateTime`] when this [`Order`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Order`] was confirmed, if it was.
    pub confirmed_at: Option<ConfirmationDateTime>,

    /// [`DateTime`] when this [`Order`] was shipped, if it was.
    pub shipped_at: Option<ShipmentDateTime>,

    /// [`DateTime`] when this [`Order`] was delivered, if it was.
    pub delivered_at: Option<DeliveryDateTime>,

    /// [`DateTime`] when this [`Order`] was paid, if it was.
    pub paid_at: Option<PaymentDateTime>,
}

impl Order {
    /// Returns whether this [`Order`] has been paid for.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Returns whether this [`Order`] may still be cancelled: only while
    /// it awaits fulfilment and has not been paid for.
    #[must_use]
    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status, Status::Pending | Status::Confirmed)
            && !self.is_paid()
    }

    /// Returns whether this [`Order`] may be returned: only a delivered
    /// and paid order, within `window` of the delivery time.
    #[must_use]
    pub fn can_be_returned(&self, window: Duration) -> bool {
        self.status == Status::Delivered
            && self.is_paid()
            && self.delivered_at.is_some_and(|at| {
                let now: DeliveryDateTime = DateTime::now().coerce();
                now >= at && now - at <= window
            })
    }

    /// Returns whether this [`Order`] may be deleted: only while it has
    /// not been paid for.
    #[must_use]
    pub fn can_be_deleted(&self) -> bool {
        !self.is_paid()
    }
}

/// ID of an [`Order`].
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

/// Human-facing number of an [`Order`] in the `ORD-yymmdd-nnnn` form.
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Number(String);

impl Number {
    /// Generates a new [`Number`] for an [`Order`] created at the provided
    /// [`DateTime`].
    ///
    /// The random suffix keeps numbers guessing-resistant; the `orders`
    /// table enforces actual uniqueness.
    #[must_use]
    pub fn generate(at: CreationDateTime) -> Self {
        let date = time::OffsetDateTime::from(at.coerce::<()>()).date();
        let bytes = Uuid::new_v4().into_bytes();
        let suffix =
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                % 10_000;
        Self(format!(
            "ORD-{:02}{:02}{:02}-{suffix:04}",
            date.year().rem_euclid(100),
            u8::from(date.month()),
            date.day(),
        ))
    }

    /// Creates a new [`Number`] if the given `number` is valid.
    #[must_use]
    pub fn new(number: impl Into<String>) -> Option<Self> {
        let number = number.into();
        Self::check(&number).then_some(Self(number))
    }

    /// Checks whether the given `number` is a valid [`Number`].
    fn check(number: impl AsRef<str>) -> bool {
        /// Regular expression checking [`Number`] format.
        static REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^ORD-\d{6}-\d{4}$").expect("valid regex")
        });

        REGEX.is_match(number.as_ref())
    }
}

impl FromStr for Number {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Number`")
    }
}

define_kind! {
    #[doc = "Fulfilment status of an [`Order`]."]
    enum Status {
        #[doc = "Placed and awaiting confirmation."]
        Pending = 1,

        #[doc = "Confirmed by the pharmacy."]
        Confirmed = 2,

        #[doc = "Being prepared for shipment."]
        Preparing = 3,

        #[doc = "Handed over to the courier."]
        Shipped = 4,

        #[doc = "Delivered to the customer."]
        Delivered = 5,

        #[doc = "Cancelled before fulfilment."]
        Cancelled = 6,

        #[doc = "Returned by the customer after delivery."]
        Returned = 7,
    }
}

impl Status {
    /// Returns the [`Status`]es this one may legally move to.
    ///
    /// This table is the single authority on fulfilment transitions;
    /// payment-dependent guards live on [`Order`] itself.
    #[must_use]
    pub fn successors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Preparing, Self::Cancelled],
            Self::Preparing => &[Self::Shipped],
            Self::Shipped => &[Self::Delivered],
            Self::Delivered => &[Self::Returned],
            Self::Cancelled | Self::Returned => &[],
        }
    }

    /// Returns whether this [`Status`] may legally move to `next`.
    #[must_use]
    pub fn can_become(self, next: Self) -> bool {
        self.successors().contains(&next)
    }
}

define_kind! {
    #[doc = "Payment status of an [`Order`]."]
    enum PaymentStatus {
        #[doc = "Payment not completed yet."]
        Pending = 1,

        #[doc = "Payment completed."]
        Paid = 2,

        #[doc = "Payment attempt failed."]
        Failed = 3,

        #[doc = "Payment returned to the customer."]
        Refunded = 4,
    }
}

/// One [`Product`]'s entry within an [`Order`].
///
/// Created once at assembly time and never mutated afterwards; the
/// product name/SKU/price/discount fields are snapshots, so later catalog
/// changes do not alter historical orders.
#[derive(Clone, Debug)]
pub struct Item {
    /// ID of the [`Order`] owning this [`Item`].
    pub order_id: Id,

    /// ID of the snapshotted [`Product`].
    pub product_id: product::Id,

    /// Name of the [`Product`] at assembly time.
    pub product_name: product::Name,

    /// SKU of the [`Product`] at assembly time.
    pub product_sku: product::Sku,

    /// Unit price of the [`Product`] at assembly time, before discounts.
    pub unit_price: Money,

    /// Number of units ordered.
    pub quantity: product::Quantity,

    /// Percentage discount of the [`Product`] at assembly time.
    pub discount_percent: Percent,

    /// Flat per-unit discount of the [`Product`] at assembly time.
    pub discount_per_unit: Money,

    /// `unit_price * quantity`.
    pub line_subtotal: Money,

    /// Discount taken off this [`Item`].
    pub line_discount: Money,

    /// `line_subtotal - line_discount`.
    pub line_total: Money,

    /// [`DateTime`] when this [`Item`] was created.
    pub created_at: CreationDateTime,
}

/// Single entry of an [`Order`]'s status audit log.
///
/// Appended on every fulfilment or payment transition; never mutated or
/// deleted.
#[derive(Clone, Debug)]
pub struct StatusHistory {
    /// ID of the [`Order`] this entry belongs to.
    pub order_id: Id,

    /// [`Status`] the [`Order`] moved from, absent for the initial entry.
    pub previous_status: Option<Status>,

    /// [`Status`] the [`Order`] moved to.
    pub new_status: Status,

    /// ID of the [`user::User`] who triggered the change, if any.
    pub changed_by: Option<user::Id>,

    /// Optional free-text [`Note`] on the change.
    pub note: Option<Note>,

    /// [`DateTime`] when the change happened.
    pub created_at: CreationDateTime,
}

/// Shipping address snapshot of an [`Order`].
///
/// A structured copy, not a reference: later edits of the customer's
/// address book leave placed orders untouched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShippingAddress {
    /// Province to deliver to.
    pub province: Province,

    /// City to deliver to.
    pub city: City,

    /// Street address line.
    pub street: Street,

    /// 10-digit Iranian postal code.
    pub postal_code: PostalCode,
}

/// Province of a [`ShippingAddress`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Province(String);

impl Province {
    /// Creates a new [`Province`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `province` is not empty.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(province: impl Into<String>) -> Self {
        Self(province.into())
    }

    /// Creates a new [`Province`] if the given `province` is valid.
    #[must_use]
    pub fn new(province: impl Into<String>) -> Option<Self> {
        let province = province.into();
        Self::check(&province).then_some(Self(province))
    }

    /// Checks whether the given `province` is a valid [`Province`].
    fn check(province: impl AsRef<str>) -> bool {
        let province = province.as_ref();
        province.trim() == province
            && !province.is_empty()
            && province.len() <= 100
    }
}

impl FromStr for Province {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Province`")
    }
}

/// City of a [`ShippingAddress`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct City(String);

impl City {
    /// Creates a new [`City`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `city` is not empty.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(city: impl Into<String>) -> Self {
        Self(city.into())
    }

    /// Creates a new [`City`] if the given `city` is valid.
    #[must_use]
    pub fn new(city: impl Into<String>) -> Option<Self> {
        let city = city.into();
        Self::check(&city).then_some(Self(city))
    }

    /// Checks whether the given `city` is a valid [`City`].
    fn check(city: impl AsRef<str>) -> bool {
        let city = city.as_ref();
        city.trim() == city && !city.is_empty() && city.len() <= 100
    }
}

impl FromStr for City {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `City`")
    }
}

/// Street address line of a [`ShippingAddress`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Street(String);

impl Street {
    /// Creates a new [`Street`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `street` is not empty.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(street: impl Into<String>) -> Self {
        Self(street.into())
    }

    /// Creates a new [`Street`] if the given `street` is valid.
    #[must_use]
    pub fn new(street: impl Into<String>) -> Option<Self> {
        let street = street.into();
        Self::check(&street).then_some(Self(street))
    }

    /// Checks whether the given `street` is a valid [`Street`].
    fn check(street: impl AsRef<str>) -> bool {
        let street = street.as_ref();
        street.trim() == street && !street.is_empty() && street.len() <= 512
    }
}

impl FromStr for Street {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Street`")
    }
}

/// 10-digit Iranian postal code of a [`ShippingAddress`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct PostalCode(String);

impl PostalCode {
    /// Creates a new [`PostalCode`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `code` matches the format.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Creates a new [`PostalCode`] if the given `code` is valid.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Option<Self> {
        let code = code.into();
        Self::check(&code).then_some(Self(code))
    }

    /// Checks whether the given `code` is a valid [`PostalCode`].
    fn check(code: impl AsRef<str>) -> bool {
        /// Regular expression checking [`PostalCode`] format.
        static REGEX: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^\d{10}$").expect("valid regex"));

        REGEX.is_match(code.as_ref())
    }
}

impl FromStr for PostalCode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `PostalCode`")
    }
}

/// Customer name snapshot on an [`Order`].
#[derive(AsRef, Clone, Debug, Display, Eq, From, PartialEq)]
#[as_ref(str, String)]
#[from(&str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct CustomerName(String);

/// Free-text note attached to an [`Order`] or a [`StatusHistory`] entry.
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
        note.trim() == note && !note.is_empty() && note.len() <= 1000
    }
}

impl FromStr for Note {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Note`")
    }
}

/// Payment gateway authority code of an [`Order`].
#[derive(AsRef, Clone, Debug, Display, Eq, From, PartialEq)]
#[as_ref(str, String)]
#[from(&str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct PaymentAuthority(String);

/// Payment gateway reference ID of an [`Order`].
#[derive(AsRef, Clone, Debug, Display, Eq, From, PartialEq)]
#[as_ref(str, String)]
#[from(&str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct PaymentRefId(String);

/// [`DateTime`] when an [`Order`] (or one of its parts) was created.
pub type CreationDateTime = DateTimeOf<(Order, unit::Creation)>;

/// Marker type indicating [`Order`] confirmation.
#[derive(Clone, Copy, Debug)]
pub struct Confirmation;

/// [`DateTime`] when an [`Order`] was confirmed.
pub type ConfirmationDateTime = DateTimeOf<(Order, Confirmation)>;

/// Marker type indicating [`Order`] shipment.
#[derive(Clone, Copy, Debug)]
pub struct Shipment;

/// [`DateTime`] when an [`Order`] was shipped.
pub type ShipmentDateTime = DateTimeOf<(Order, Shipment)>;

/// Marker type indicating [`Order`] delivery.
#[derive(Clone, Copy, Debug)]
pub struct Delivery;

/// [`DateTime`] when an [`Order`] was delivered.
pub type DeliveryDateTime = DateTimeOf<(Order, Delivery)>;

/// Marker type indicating [`Order`] payment.
#[derive(Clone, Copy, Debug)]
pub struct Payment;

/// [`DateTime`] when an [`Order`] was paid.
pub type PaymentDateTime = DateTimeOf<(Order, Payment)>;
