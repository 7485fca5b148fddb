//! [`Query`] collection related to the multiple [`Order`]s.

use common::operations::By;

use crate::read;
#[cfg(doc)]
use crate::{domain::Order, Query};

use super::DatabaseQuery;

/// Queries a list of [`Order`]s.
pub type List = DatabaseQuery<
    By<read::order::list::Page, read::order::list::Selector>,
>;

/// Queries total count of [`Order`]s.
pub type TotalCount = DatabaseQuery<By<read::order::list::TotalCount, ()>>;
