//! [`ExpireStaleOrders`] [`Task`].

use std::{convert::Infallible, error::Error, time};

use common::{
    operations::{
        By, Commit, Insert, Lock, Perform, Select, Start, Transact,
        Transacted, Update,
    },
    DateTime,
};
use derive_more::{Display, Error as StdError, From};
use tokio::time::interval;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{order, product, stock, Order, Product},
    infra::{database, Database},
    inventory, read, Service,
};

use super::Task;

/// Configuration for [`ExpireStaleOrders`] [`Task`].
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Interval between sweeps.
    pub interval: time::Duration,

    /// Age after which a payment-pending [`Order`] is considered
    /// abandoned.
    pub timeout: time::Duration,
}

/// [`Task`] for cancelling [`Order`]s whose payment never arrived.
///
/// An abandoned checkout keeps its units reserved forever otherwise;
/// every sweep cancels such orders and puts the units back on the shelf.
#[derive(Clone, Copy, Debug)]
pub struct ExpireStaleOrders<S> {
    /// [`Config`] of this [`Task`].
    config: Config,

    /// [`Service`] instance.
    service: S,
}

impl<S> ExpireStaleOrders<S> {
    /// Creates a new [`ExpireStaleOrders`] [`Task`].
    #[must_use]
    pub fn new(config: Config, service: S) -> Self {
        Self { config, service }
    }
}

impl<Db> Task<Start<By<ExpireStaleOrders<Self>, Config>>> for Service<Db>
where
    ExpireStaleOrders<Service<Db>>:
        Task<Perform<()>, Ok = (), Err: Error> + Send + Sync + 'static,
    Self: Clone,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        Start(by): Start<By<ExpireStaleOrders<Self>, Config>>,
    ) -> Result<Self::Ok, Self::Err> {
        let config = by.into_inner();
        let task = ExpireStaleOrders::new(config, self.clone());

        let mut interval = interval(task.config.interval);
        loop {
            let _ = interval.tick().await;
            _ = task.execute(Perform(())).await.map_err(|e| {
                log::error!("`task::ExpireStaleOrders` failed: {e}");
            });
        }
    }
}

impl<Db> Task<Perform<()>> for ExpireStaleOrders<Service<Db>>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Vec<order::Id>, read::order::UnpaidSince>>,
            Ok = Vec<order::Id>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Order, order::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Order>, order::Id>>,
            Ok = Option<Order>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<order::Item>, order::Id>>,
            Ok = Vec<order::Item>,
            Err = Traced<database::Error>,
        > + Database<Update<Order>, Err = Traced<database::Error>>
        + Database<
            Insert<order::StatusHistory>,
            Err = Traced<database::Error>,
        > + Database<Commit, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Product, product::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Product>, product::Id>>,
            Ok = Option<Product>,
            Err = Traced<database::Error>,
        > + Database<Update<Product>, Err = Traced<database::Error>>
        + Database<Insert<stock::Movement>, Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<ExecutionError>;

    async fn execute(&self, _: Perform<()>) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let deadline: order::CreationDateTime =
            DateTime::now().coerce::<_>() - self.config.timeout;

        let stale = self
            .service
            .database()
            .execute(Select(By::<Vec<order::Id>, _>::new(
                read::order::UnpaidSince(deadline),
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        for order_id in stale {
            let tx = self
                .service
                .database()
                .execute(Transact)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;

            tx.execute(Lock(By::new(order_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;

            // The order may have been paid or cancelled since the sweep
            // selected it.
            let Some(mut order) = tx
                .execute(Select(By::<Option<Order>, _>::new(order_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .filter(|o| {
                    o.payment_status == order::PaymentStatus::Pending
                        && o.can_be_cancelled()
                })
            else {
                continue;
            };

            let items = tx
                .execute(Select(By::<Vec<order::Item>, _>::new(order_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            let demands = items
                .iter()
                .map(|i| inventory::Demand {
                    product_id: i.product_id,
                    quantity: i.quantity,
                })
                .collect::<Vec<_>>();

            inventory::restock(
                &tx,
                &demands,
                stock::Kind::Return,
                None,
                stock::Note::new("Expired unpaid order"),
            )
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

            let previous = order.status;
            order.status = order::Status::Cancelled;

            tx.execute(Update(order))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            tx.execute(Insert(order::StatusHistory {
                order_id,
                previous_status: Some(previous),
                new_status: order::Status::Cancelled,
                changed_by: None,
                note: order::Note::new("Cancelled: payment never arrived"),
                created_at: DateTime::now().coerce(),
            }))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

            tx.execute(Commit)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;

            log::info!("`task::ExpireStaleOrders` cancelled `Order(id: {order_id})`");
        }

        Ok(())
    }
}

/// Error of [`ExpireStaleOrders`] [`Task`] execution.
#[derive(Debug, Display, From, StdError)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// Inventory guard error.
    #[display("Inventory operation failed: {_0}")]
    Inventory(inventory::Error),
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use common::{operations::Perform, Handler as _};

    use crate::{
        command::{AddToCart, CreateOrder},
        domain::order,
        infra::database::mock::{fixtures, Store},
        task::ExpireStaleOrders,
    };

    use super::Config;

    #[tokio::test]
    async fn cancels_and_restocks_stale_orders() {
        let user = fixtures::user();
        let product = fixtures::product(100_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, mock) = fixtures::service(store);

        drop(
            service
                .execute(AddToCart {
                    user_id: user.id,
                    product_id: product.id,
                    quantity: 2,
                })
                .await
                .unwrap(),
        );
        let order = service
            .execute(CreateOrder {
                user_id: user.id,
                shipping_address: fixtures::address(),
                customer_note: None,
            })
            .await
            .unwrap();
        assert_eq!(mock.snapshot().await.products[&product.id].quantity, 3);

        // Let the clock visibly pass the order's creation instant.
        tokio::time::sleep(Duration::from_millis(5)).await;

        // With a zero timeout every payment-pending order is stale.
        let task = ExpireStaleOrders::new(
            Config {
                interval: Duration::from_secs(3600),
                timeout: Duration::ZERO,
            },
            service,
        );
        task.execute(Perform(())).await.unwrap();

        let store = mock.snapshot().await;
        assert_eq!(
            store.orders[&order.id].status,
            order::Status::Cancelled,
        );
        assert_eq!(store.products[&product.id].quantity, 5);
    }
}
