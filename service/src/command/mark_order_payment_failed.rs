//! [`Command`] for recording a failed payment attempt on an [`Order`].

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{order, Order},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for marking an [`Order`]'s payment attempt as failed.
///
/// Idempotent on an already-failed [`Order`]. A failed order stays
/// payable: the gateway may retry and succeed later.
#[derive(Clone, Copy, Debug)]
pub struct MarkOrderPaymentFailed {
    /// ID of the [`Order`] whose payment failed.
    pub order_id: order::Id,
}

impl<Db> Command<MarkOrderPaymentFailed> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
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
        cmd: MarkOrderPaymentFailed,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let MarkOrderPaymentFailed { order_id } = cmd;

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

        if order.payment_status == order::PaymentStatus::Failed {
            return Ok(order);
        }
        if order.is_paid()
            || order.payment_status == order::PaymentStatus::Refunded
        {
            return Err(tracerr::new!(E::OrderAlreadyPaid(order_id)));
        }

        order.payment_status = order::PaymentStatus::Failed;

        tx.execute(Update(order.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Insert(order::StatusHistory {
            order_id,
            previous_status: Some(order.status),
            new_status: order.status,
            changed_by: None,
            note: order::Note::new("Payment attempt failed"),
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

/// Error of [`MarkOrderPaymentFailed`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Order`] was already paid for (or refunded).
    #[display("`Order(id: {_0})` was already paid for")]
    OrderAlreadyPaid(#[error(not(source))] order::Id),

    /// [`Order`] with the provided ID does not exist.
    #[display("`Order(id: {_0})` does not exist")]
    OrderNotExists(#[error(not(source))] order::Id),
}

#[cfg(test)]
mod spec {
    use common::{DateTime, Handler as _};

    use crate::{
        command::{AddToCart, CreateOrder, MarkOrderPaid},
        domain::order,
        infra::database::mock::{fixtures, Store},
    };

    use super::{ExecutionError, MarkOrderPaymentFailed};

    #[tokio::test]
    async fn records_failure_and_allows_retry() {
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

        let failed = service
            .execute(MarkOrderPaymentFailed { order_id: order.id })
            .await
            .unwrap();
        assert_eq!(failed.payment_status, order::PaymentStatus::Failed);

        // Second failure report is a no-op.
        let again = service
            .execute(MarkOrderPaymentFailed { order_id: order.id })
            .await
            .unwrap();
        assert_eq!(again.payment_status, order::PaymentStatus::Failed);

        // The gateway retry may still succeed afterwards.
        let paid = service
            .execute(MarkOrderPaid {
                order_id: order.id,
                authority: "A-2".into(),
                ref_id: "R-2".into(),
                paid_at: DateTime::now().coerce(),
            })
            .await
            .unwrap();
        assert_eq!(paid.payment_status, order::PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn refuses_paid_order() {
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
            .execute(MarkOrderPaymentFailed { order_id: order.id })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::OrderAlreadyPaid(_),
        ));
    }
}
