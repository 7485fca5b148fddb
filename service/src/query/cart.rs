//! [`Query`] collection related to a [`Cart`].

use common::operations::By;

use crate::{domain::user, read};
#[cfg(doc)]
use crate::{domain::Cart, Query};

use super::DatabaseQuery;

/// Queries the [`read::cart::Contents`] of a [`user::User`]'s [`Cart`].
///
/// An absent or empty [`Cart`] yields empty [`read::cart::Contents`].
pub type ForUser = DatabaseQuery<By<read::cart::Contents, user::Id>>;
