//! [`Command`] for returning a delivered [`Order`].

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{order, product, stock, user, Order, Product, User},
    infra::{database, Database},
    inventory, Service,
};

use super::Command;

/// [`Command`] for returning a delivered and paid [`Order`] within the
/// configured return window.
///
/// Marks the payment as refunded and puts every unit back to stock.
#[derive(Clone, Debug)]
pub struct ReturnOrder {
    /// ID of the [`Order`] to return.
    pub order_id: order::Id,

    /// ID of the [`User`] requesting the return.
    pub initiator_id: user::Id,

    /// Optional [`order::Note`] explaining the return.
    pub note: Option<order::Note>,
}

impl<Db> Command<ReturnOrder> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
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
    type Ok = Order;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: ReturnOrder) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ReturnOrder {
            order_id,
            initiator_id,
            note,
        } = cmd;

        let initiator = self
            .database()
            .execute(Select(By::<Option<User>, _>::new(initiator_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .filter(|u| u.deleted_at.is_none())
            .ok_or(E::UserNotExists(initiator_id))
            .map_err(tracerr::wrap!())?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        tx.execute(Lock(By::new(order_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut order = tx
            .execute(Select(By::<Option<Order>, _>::new(order_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::OrderNotExists(order_id))
            .map_err(tracerr::wrap!())?;

        if order.user_id != initiator.id && !initiator.is_staff {
            return Err(tracerr::new!(E::UserNotOwner(initiator_id)));
        }
        if !order.can_be_returned(self.config().return_window) {
            return Err(tracerr::new!(E::CannotBeReturned(order_id)));
        }

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
            Some(initiator.id),
            None,
        )
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let previous = order.status;
        order.status = order::Status::Returned;
        order.payment_status = order::PaymentStatus::Refunded;

        tx.execute(Update(order.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Insert(order::StatusHistory {
            order_id,
            previous_status: Some(previous),
            new_status: order::Status::Returned,
            changed_by: Some(initiator.id),
            note,
            created_at: DateTime::now().coerce(),
        }))
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))
        .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(order)
    }
}

/// Error of [`ReturnOrder`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Order`] cannot be returned in its current state.
    #[display("`Order(id: {_0})` cannot be returned")]
    CannotBeReturned(#[error(not(source))] order::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Order`] with the provided ID does not exist.
    #[display("`Order(id: {_0})` does not exist")]
    OrderNotExists(#[error(not(source))] order::Id),

    /// [`Product`] of an ordered item vanished from the catalog.
    #[display("`Product(id: {_0})` does not exist")]
    ProductNotExists(#[error(not(source))] product::Id),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    UserNotExists(#[error(not(source))] user::Id),

    /// [`User`] neither owns the [`Order`] nor is a staff member.
    #[display("`User(id: {_0})` is not allowed to manage this order")]
    UserNotOwner(#[error(not(source))] user::Id),
}

impl From<inventory::Error> for ExecutionError {
    fn from(e: inventory::Error) -> Self {
        match e {
            inventory::Error::Db(e) => Self::Db(e),
            inventory::Error::InsufficientStock { product_id, .. }
            | inventory::Error::ProductNotExists(product_id) => {
                Self::ProductNotExists(product_id)
            }
        }
    }
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use common::{DateTime, Handler as _};

    use crate::{
        command::{AddToCart, CreateOrder, MarkOrderPaid},
        domain::order,
        infra::database::mock::{fixtures, Mock, Store},
        Service,
    };

    use super::{ExecutionError, ReturnOrder};

    /// Seeds a paid and delivered order of 2 units, delivered `ago` in
    /// the past.
    async fn delivered_order(
        ago: Duration,
    ) -> (Service<Mock>, Mock, crate::domain::User, order::Id) {
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
        drop(
            service
                .execute(MarkOrderPaid {
                    order_id: order.id,
                    authority: "A-1".into(),
                    ref_id: "R-1".into(),
                    paid_at: DateTime::now().coerce(),
                })
                .await
                .unwrap(),
        );

        mock.update(|store| {
            let o = store.orders.get_mut(&order.id).unwrap();
            o.status = order::Status::Delivered;
            o.delivered_at = Some(DateTime::now().coerce::<_>() - ago);
        })
        .await;

        (service, mock, user, order.id)
    }

    #[tokio::test]
    async fn returns_within_window() {
        let (service, mock, user, order_id) =
            delivered_order(Duration::from_secs(24 * 60 * 60)).await;

        let returned = service
            .execute(ReturnOrder {
                order_id,
                initiator_id: user.id,
                note: None,
            })
            .await
            .unwrap();

        assert_eq!(returned.status, order::Status::Returned);
        assert_eq!(
            returned.payment_status,
            order::PaymentStatus::Refunded,
        );

        // Both units are back on the shelf.
        let store = mock.snapshot().await;
        let product_id = store.order_items[&order_id][0].product_id;
        assert_eq!(store.products[&product_id].quantity, 5);
    }

    #[tokio::test]
    async fn rejects_outside_window() {
        let (service, _, user, order_id) =
            delivered_order(Duration::from_secs(8 * 24 * 60 * 60)).await;

        let result = service
            .execute(ReturnOrder {
                order_id,
                initiator_id: user.id,
                note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::CannotBeReturned(_),
        ));
    }

    #[tokio::test]
    async fn rejects_undelivered_order() {
        let user = fixtures::user();
        let product = fixtures::product(100_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, _) = fixtures::service(store);

        drop(
            service
                .execute(AddToCart {
                    user_id: user.id,
                    product_id: product.id,
                    quantity: 1,
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

        let result = service
            .execute(ReturnOrder {
                order_id: order.id,
                initiator_id: user.id,
                note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::CannotBeReturned(_),
        ));
    }
}
