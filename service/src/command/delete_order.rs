//! [`Command`] for deleting an [`Order`].

use common::operations::{
    By, Commit, Delete, Insert, Lock, Select, Transact, Transacted, Update,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{order, product, stock, user, Order, Product, User},
    infra::{database, Database},
    inventory, Service,
};

use super::Command;

/// [`Command`] for deleting an [`Order`] with its items and history.
///
/// Forbidden once the order is paid for. A deleted order that was still
/// holding stock (not yet cancelled or returned) gives the units back
/// first, so deletion never leaks inventory.
#[derive(Clone, Copy, Debug)]
pub struct DeleteOrder {
    /// ID of the [`Order`] to delete.
    pub order_id: order::Id,

    /// ID of the [`User`] requesting the deletion.
    pub initiator_id: user::Id,
}

impl<Db> Command<DeleteOrder> for Service<Db>
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
        > + Database<Delete<By<Order, order::Id>>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
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

    async fn execute(&self, cmd: DeleteOrder) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let DeleteOrder {
            order_id,
            initiator_id,
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

        let order = tx
            .execute(Select(By::<Option<Order>, _>::new(order_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::OrderNotExists(order_id))
            .map_err(tracerr::wrap!())?;

        if order.user_id != initiator.id && !initiator.is_staff {
            return Err(tracerr::new!(E::UserNotOwner(initiator_id)));
        }
        if !order.can_be_deleted() {
            return Err(tracerr::new!(E::OrderPaid(order_id)));
        }

        // Cancelled and returned orders already gave their stock back.
        let still_holding_stock = !matches!(
            order.status,
            order::Status::Cancelled | order::Status::Returned,
        );
        if still_holding_stock {
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
        }

        tx.execute(Delete(By::<Order, _>::new(order_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(())
    }
}

/// Error of [`DeleteOrder`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Order`] with the provided ID does not exist.
    #[display("`Order(id: {_0})` does not exist")]
    OrderNotExists(#[error(not(source))] order::Id),

    /// [`Order`] was paid for and cannot be deleted.
    #[display("`Order(id: {_0})` was paid for and cannot be deleted")]
    OrderPaid(#[error(not(source))] order::Id),

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
    use common::{DateTime, Handler as _};

    use crate::{
        command::{AddToCart, CreateOrder, MarkOrderPaid},
        infra::database::mock::{fixtures, Store},
    };

    use super::{DeleteOrder, ExecutionError};

    #[tokio::test]
    async fn deletes_unpaid_order_and_restocks() {
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

        service
            .execute(DeleteOrder {
                order_id: order.id,
                initiator_id: user.id,
            })
            .await
            .unwrap();

        let store = mock.snapshot().await;
        assert!(store.orders.is_empty());
        assert!(store.order_items.is_empty());
        assert!(store.order_history.is_empty());
        assert_eq!(store.products[&product.id].quantity, 5);
    }

    #[tokio::test]
    async fn paid_order_cannot_be_deleted() {
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

        let result = service
            .execute(DeleteOrder {
                order_id: order.id,
                initiator_id: user.id,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::OrderPaid(_),
        ));
        assert_eq!(mock.snapshot().await.orders.len(), 1);
    }
}
