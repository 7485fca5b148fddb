//! [`Query`] collection related to the multiple [`Product`]s.

use common::operations::By;

use crate::read;
#[cfg(doc)]
use crate::{domain::Product, Query};

use super::DatabaseQuery;

/// Queries a list of [`Product`]s.
pub type List = DatabaseQuery<
    By<read::product::list::Page, read::product::list::Selector>,
>;

/// Queries total count of [`Product`]s.
pub type TotalCount = DatabaseQuery<By<read::product::list::TotalCount, ()>>;
