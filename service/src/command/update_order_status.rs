//! [`Command`] for moving an [`Order`] along the fulfilment pipeline.

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{order, user, Order, User},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for a staff member to advance an [`Order`]'s fulfilment
/// [`order::Status`].
///
/// Only the forward pipeline is reachable here
/// (`confirmed`/`preparing`/`shipped`/`delivered`); cancellation and
/// returns have their own commands with their own guards.
#[derive(Clone, Debug)]
pub struct UpdateOrderStatus {
    /// ID of the [`Order`] to advance.
    pub order_id: order::Id,

    /// ID of the staff [`User`] making the change.
    pub initiator_id: user::Id,

    /// [`order::Status`] to move the [`Order`] to.
    pub new_status: order::Status,

    /// Optional [`order::Note`] on the change.
    pub note: Option<order::Note>,
}

impl<Db> Command<UpdateOrderStatus> for Service<Db>
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
        > + Database<Update<Order>, Err = Traced<database::Error>>
        + Database<
            Insert<order::StatusHistory>,
            Err = Traced<database::Error>,
        > + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Order;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: UpdateOrderStatus,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let UpdateOrderStatus {
            order_id,
            initiator_id,
            new_status,
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
        if !initiator.is_staff {
            return Err(tracerr::new!(E::UserNotStaff(initiator_id)));
        }

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

        let terminal = matches!(
            new_status,
            order::Status::Cancelled | order::Status::Returned,
        );
        if terminal || !order.status.can_become(new_status) {
            return Err(tracerr::new!(E::InvalidTransition {
                from: order.status,
                to: new_status,
            }));
        }

        let previous = order.status;
        order.status = new_status;
        match new_status {
            order::Status::Confirmed => {
                order.confirmed_at = Some(DateTime::now().coerce());
            }
            order::Status::Shipped => {
                order.shipped_at = Some(DateTime::now().coerce());
            }
            order::Status::Delivered => {
                order.delivered_at = Some(DateTime::now().coerce());
            }
            order::Status::Pending
            | order::Status::Preparing
            | order::Status::Cancelled
            | order::Status::Returned => {}
        }

        tx.execute(Update(order.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Insert(order::StatusHistory {
            order_id,
            previous_status: Some(previous),
            new_status,
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

/// Error of [`UpdateOrderStatus`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Requested move is not a legal fulfilment transition.
    #[display("`Order` cannot move from `{from}` to `{to}`")]
    InvalidTransition {
        /// Current [`order::Status`] of the [`Order`].
        from: order::Status,

        /// Requested [`order::Status`].
        to: order::Status,
    },

    /// [`Order`] with the provided ID does not exist.
    #[display("`Order(id: {_0})` does not exist")]
    OrderNotExists(#[error(not(source))] order::Id),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    UserNotExists(#[error(not(source))] user::Id),

    /// [`User`] is not a staff member.
    #[display("`User(id: {_0})` is not a staff member")]
    UserNotStaff(#[error(not(source))] user::Id),
}

#[cfg(test)]
mod spec {
    use common::Handler as _;

    use crate::{
        command::{AddToCart, CreateOrder},
        domain::order,
        infra::database::mock::{fixtures, Store},
    };

    use super::{ExecutionError, UpdateOrderStatus};

    async fn seeded() -> (
        crate::Service<crate::infra::database::mock::Mock>,
        crate::infra::database::mock::Mock,
        crate::domain::User,
        crate::domain::User,
        order::Id,
    ) {
        let customer = fixtures::user();
        let staff = fixtures::staff();
        let product = fixtures::product(100_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(customer.id, customer.clone()));
        drop(store.users.insert(staff.id, staff.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, mock) = fixtures::service(store);

        drop(
            service
                .execute(AddToCart {
                    user_id: customer.id,
                    product_id: product.id,
                    quantity: 1,
                })
                .await
                .unwrap(),
        );
        let order = service
            .execute(CreateOrder {
                user_id: customer.id,
                shipping_address: fixtures::address(),
                customer_note: None,
            })
            .await
            .unwrap();

        (service, mock, customer, staff, order.id)
    }

    #[tokio::test]
    async fn staff_advances_pipeline_with_timestamps() {
        let (service, mock, _, staff, order_id) = seeded().await;

        let order = service
            .execute(UpdateOrderStatus {
                order_id,
                initiator_id: staff.id,
                new_status: order::Status::Confirmed,
                note: None,
            })
            .await
            .unwrap();

        assert_eq!(order.status, order::Status::Confirmed);
        assert!(order.confirmed_at.is_some());

        let history = &mock.snapshot().await.order_history[&order_id];
        assert_eq!(history.len(), 2);
        assert_eq!(
            history[1].previous_status,
            Some(order::Status::Pending),
        );
        assert_eq!(history[1].new_status, order::Status::Confirmed);
        assert_eq!(history[1].changed_by, Some(staff.id));
    }

    #[tokio::test]
    async fn rejects_non_staff() {
        let (service, _, customer, _, order_id) = seeded().await;

        let result = service
            .execute(UpdateOrderStatus {
                order_id,
                initiator_id: customer.id,
                new_status: order::Status::Confirmed,
                note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::UserNotStaff(_),
        ));
    }

    #[tokio::test]
    async fn rejects_skipping_stages() {
        let (service, _, _, staff, order_id) = seeded().await;

        let result = service
            .execute(UpdateOrderStatus {
                order_id,
                initiator_id: staff.id,
                new_status: order::Status::Shipped,
                note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::InvalidTransition {
                from: order::Status::Pending,
                to: order::Status::Shipped,
            },
        ));
    }

    #[tokio::test]
    async fn cancellation_is_not_reachable_here() {
        let (service, _, _, staff, order_id) = seeded().await;

        let result = service
            .execute(UpdateOrderStatus {
                order_id,
                initiator_id: staff.id,
                new_status: order::Status::Cancelled,
                note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::InvalidTransition { .. },
        ));
    }
}
