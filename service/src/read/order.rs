//! [`Order`] read model definition.

#[cfg(doc)]
use common::DateTime;

use crate::domain::{order, Order};

/// [`Order`] together with its [`order::Item`]s.
#[derive(Clone, Debug)]
pub struct WithItems {
    /// The [`Order`] itself.
    pub order: Order,

    /// [`order::Item`]s of the [`Order`].
    pub items: Vec<order::Item>,
}

/// Selector of [`Order`]s still awaiting payment that were created before
/// the carried [`DateTime`].
#[derive(Clone, Copy, Debug)]
pub struct UnpaidSince(pub order::CreationDateTime);

pub mod list {
    //! [`Order`]s list definitions.

    use std::ops;

    use common::define_pagination;
    use derive_more::{From, Into};

    use crate::domain::{order, user};
    #[cfg(doc)]
    use crate::domain::Order;

    define_pagination!(Cursor, Node, Filter);

    /// Node in a [`Connection`].
    pub type Node = (order::Id, order::Status);

    /// Cursor pointing to a specific [`Order`] in a list.
    pub type Cursor = order::Id;

    /// Filter for [`Selector`].
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Filter {
        /// Only [`Order`]s of this [`user::User`].
        pub user_id: Option<user::Id>,

        /// Only [`Order`]s in this [`order::Status`].
        pub status: Option<order::Status>,
    }

    /// Total count of [`Order`]s.
    #[derive(Clone, Copy, Debug, Eq, From, Hash, Into, PartialEq)]
    pub struct TotalCount(i32);

    impl ops::Div for TotalCount {
        type Output = f64;

        fn div(self, rhs: Self) -> Self::Output {
            f64::from(self.0) / f64::from(rhs.0)
        }
    }
}
