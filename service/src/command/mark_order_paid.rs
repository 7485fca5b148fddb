//! [`Command`] for recording a successful payment on an [`Order`].

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

/// [`Command`] for marking an [`Order`] as paid.
///
/// The payment gateway's callback entry point. Idempotent: re-invoking it
/// on an already-paid [`Order`] returns the order unchanged, without a
/// second history entry or timestamp overwrite. Stock is untouched here:
/// it was already decremented when the order was assembled.
#[derive(Clone, Debug)]
pub struct MarkOrderPaid {
    /// ID of the [`Order`] that was paid.
    pub order_id: order::Id,

    /// Gateway authority code of the payment.
    pub authority: order::PaymentAuthority,

    /// Gateway reference ID of the payment.
    pub ref_id: order::PaymentRefId,

    /// [`DateTime`] when the payment happened.
    pub paid_at: order::PaymentDateTime,
}

impl<Db> Command<MarkOrderPaid> for Service<Db>
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
        cmd: MarkOrderPaid,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let MarkOrderPaid {
            order_id,
            authority,
            ref_id,
            paid_at,
        } = cmd;

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

        if order.is_paid() {
            // Gateways retry their callbacks; the first confirmation won.
            return Ok(order);
        }

        if matches!(
            order.status,
            order::Status::Cancelled | order::Status::Returned,
        ) || order.payment_status == order::PaymentStatus::Refunded
        {
            return Err(tracerr::new!(E::OrderNotPayable(order_id)));
        }

        order.payment_status = order::PaymentStatus::Paid;
        order.paid_at = Some(paid_at);
        order.payment_authority = Some(authority);
        order.payment_ref_id = Some(ref_id);

        tx.execute(Update(order.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Insert(order::StatusHistory {
            order_id,
            previous_status: Some(order.status),
            new_status: order.status,
            changed_by: None,
            note: order::Note::new("Payment confirmed by the gateway"),
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

/// Error of [`MarkOrderPaid`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Order`] with the provided ID does not exist.
    #[display("`Order(id: {_0})` does not exist")]
    OrderNotExists(#[error(not(source))] order::Id),

    /// [`Order`] is in a state that cannot accept a payment.
    #[display("`Order(id: {_0})` cannot accept a payment")]
    OrderNotPayable(#[error(not(source))] order::Id),
}
