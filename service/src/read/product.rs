//! [`Product`] read model definition.

pub mod list {
    //! [`Product`]s list definitions.

    use common::define_pagination;
    use derive_more::{From, Into};

    use crate::domain::product;
    #[cfg(doc)]
    use crate::domain::Product;

    define_pagination!(Cursor, Node, Filter);

    /// Node in a [`Connection`].
    pub type Node = product::Id;

    /// Cursor pointing to a specific [`Product`] in a list.
    pub type Cursor = product::Id;

    /// Filter for [`Selector`].
    #[derive(Clone, Debug, Default)]
    pub struct Filter {
        /// [`product::Name`] (or its part) to fuzzy search for.
        pub name: Option<product::Name>,

        /// Only [`Product`]s that are active and in stock.
        pub only_available: bool,
    }

    /// Total count of [`Product`]s.
    #[derive(Clone, Copy, Debug, Eq, From, Hash, Into, PartialEq)]
    pub struct TotalCount(i32);
}
