//! [`Command`] for cancelling an [`Order`].

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

/// [`Command`] for cancelling a not-yet-paid [`Order`].
///
/// Allowed to the order's owner or a staff member while the order is
/// still `pending`/`confirmed` and unpaid. Returns every ordered unit
/// back to stock, since checkout had decremented it.
#[derive(Clone, Debug)]
pub struct CancelOrder {
    /// ID of the [`Order`] to cancel.
    pub order_id: order::Id,

    /// ID of the [`User`] requesting the cancellation.
    pub initiator_id: user::Id,

    /// Optional [`order::Note`] explaining the cancellation.
    pub note: Option<order::Note>,
}

impl<Db> Command<CancelOrder> for Service<Db>
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

    async fn execute(&self, cmd: CancelOrder) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CancelOrder {
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
        if !order.can_be_cancelled() {
            return Err(tracerr::new!(E::CannotBeCancelled(order_id)));
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
        order.status = order::Status::Cancelled;

        tx.execute(Update(order.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Insert(order::StatusHistory {
            order_id,
            previous_status: Some(previous),
            new_status: order::Status::Cancelled,
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

/// Error of [`CancelOrder`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Order`] cannot be cancelled in its current state.
    #[display("`Order(id: {_0})` cannot be cancelled")]
    CannotBeCancelled(#[error(not(source))] order::Id),

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
            // Restocking never runs short; map the leftovers verbatim.
            inventory::Error::InsufficientStock { product_id, .. }
            | inventory::Error::ProductNotExists(product_id) => {
                Self::ProductNotExists(product_id)
            }
        }
    }
}
