//! Service contains the business logic of the pharmacy storefront.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod domain;
pub mod infra;
pub mod inventory;
pub mod query;
pub mod read;
pub mod task;

use std::time::Duration;

use common::operations::{By, Start};
use derive_more::{Debug, Display, Error};

use crate::domain::pricing;
#[cfg(doc)]
use infra::Database;

pub use self::{command::Command, query::Query, task::Task};

/// [`Service`] configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// [JWT] decoding key verifying [`domain::user::Session`] tokens.
    ///
    /// [JWT]: https://datatracker.ietf.org/doc/html/rfc7519
    #[debug(skip)]
    pub jwt_decoding_key: jsonwebtoken::DecodingKey,

    /// Shipping rule applied at checkout.
    pub shipping: pricing::ShippingConfig,

    /// Window after delivery during which an order may be returned.
    pub return_window: Duration,

    /// [`task::ExpireStaleOrders`] configuration.
    pub expire_stale_orders: task::expire_stale_orders::Config,
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,
}

impl<Db> Service<Db> {
    /// Creates a new [`Service`] with the provided parameters.
    pub fn new(config: Config, database: Db) -> (Self, task::Background)
    where
        Self: Task<
                Start<
                    By<
                        task::ExpireStaleOrders<Self>,
                        task::expire_stale_orders::Config,
                    >,
                >,
                Ok = (),
                Err: Error,
            > + Clone
            + 'static,
    {
        let this = Service { config, database };

        let mut bg = task::Background::default();
        let svc = this.clone();
        bg.spawn(async move {
            svc.execute(Start(By::new(svc.config().expire_stale_orders)))
                .await
        });

        (this, bg)
    }

    /// Returns [`Config`] of this [`Service`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }
}

#[cfg(test)]
impl<Db> Service<Db> {
    /// Creates a new [`Service`] without spawning any background
    /// [`Task`]s.
    pub(crate) fn new_detached(config: Config, database: Db) -> Self {
        Self { config, database }
    }
}

/// Shortcut for the error of starting a [`Task`].
type TaskStartError<Svc, T, Args> = <Svc as Task<Start<By<T, Args>>>>::Err;

/// Error of starting a [`Service`].
#[derive(Debug, Display, Error)]
pub enum StartupError<Svc>
where
    Svc: Task<
        Start<
            By<
                task::ExpireStaleOrders<Svc>,
                task::expire_stale_orders::Config,
            >,
        >,
    >,
{
    /// [`task::ExpireStaleOrders`] failed to start.
    ExpireStaleOrdersTask(
        TaskStartError<
            Svc,
            task::ExpireStaleOrders<Svc>,
            task::expire_stale_orders::Config,
        >,
    ),
}
