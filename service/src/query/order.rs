//! [`Query`] collection related to a single [`Order`].

use common::operations::By;

use crate::{
    domain::{order, Order},
    read,
};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries an [`Order`] by its [`order::Id`].
pub type ById = DatabaseQuery<By<Option<Order>, order::Id>>;

/// Queries an [`Order`] together with its [`order::Item`]s by its
/// [`order::Id`].
pub type WithItems =
    DatabaseQuery<By<Option<read::order::WithItems>, order::Id>>;

/// Queries the [`order::StatusHistory`] log of an [`Order`].
pub type History = DatabaseQuery<By<Vec<order::StatusHistory>, order::Id>>;
