//! [`Command`] for manually adjusting a [`Product`]'s stock.

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{product, stock, user, Product, User},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for a staff member to record a manual stock
/// [`stock::Movement`] (deliveries, corrections, write-offs).
///
/// Sales are not recordable here: they only happen through checkout.
#[derive(Clone, Debug)]
pub struct AdjustStock {
    /// ID of the [`Product`] whose stock to adjust.
    pub product_id: product::Id,

    /// ID of the staff [`User`] making the adjustment.
    pub initiator_id: user::Id,

    /// [`stock::Kind`] of the adjustment.
    pub kind: stock::Kind,

    /// Signed change of the on-hand quantity.
    pub quantity: i32,

    /// Optional [`stock::Note`] describing the adjustment.
    pub note: Option<stock::Note>,
}

impl<Db> Command<AdjustStock> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Product, product::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Product>, product::Id>>,
            Ok = Option<Product>,
            Err = Traced<database::Error>,
        > + Database<Update<Product>, Err = Traced<database::Error>>
        + Database<Insert<stock::Movement>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = stock::Movement;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: AdjustStock) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let AdjustStock {
            product_id,
            initiator_id,
            kind,
            quantity,
            note,
        } = cmd;

        if quantity == 0 {
            return Err(tracerr::new!(E::InvalidQuantity(quantity)));
        }
        if kind == stock::Kind::Sale {
            return Err(tracerr::new!(E::KindNotManual(kind)));
        }

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

        tx.execute(Lock(By::new(product_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut product = tx
            .execute(Select(By::<Option<Product>, _>::new(product_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ProductNotExists(product_id))
            .map_err(tracerr::wrap!())?;

        let before = product.quantity;
        let after = i64::from(before) + i64::from(quantity);
        if after < 0 {
            return Err(tracerr::new!(E::InsufficientStock {
                product_id,
                available: before,
            }));
        }
        let after =
            u32::try_from(after).expect("`after_quantity` overflow");

        product.quantity = after;
        tx.execute(Update(product))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let movement = stock::Movement {
            id: stock::Id::new(),
            product_id,
            kind,
            quantity,
            before_quantity: before,
            after_quantity: after,
            note,
            created_by: Some(initiator.id),
            created_at: DateTime::now().coerce(),
        };
        tx.execute(Insert(movement.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(movement)
    }
}

/// Error of [`AdjustStock`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Product`] is short on on-hand stock for this adjustment.
    #[display(
        "`Product(id: {product_id})` has only {available} unit(s) in stock"
    )]
    InsufficientStock {
        /// ID of the short [`Product`].
        product_id: product::Id,

        /// Units actually available.
        available: product::Quantity,
    },

    /// Adjustment quantity of zero changes nothing.
    #[display("Quantity of {_0} unit(s) is invalid")]
    InvalidQuantity(#[error(not(source))] i32),

    /// Sales cannot be recorded manually.
    #[display("`{_0}` movements are not recordable manually")]
    KindNotManual(#[error(not(source))] stock::Kind),

    /// [`Product`] with the provided ID does not exist.
    #[display("`Product(id: {_0})` does not exist")]
    ProductNotExists(#[error(not(source))] product::Id),

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
        domain::stock,
        infra::database::mock::{fixtures, Store},
    };

    use super::{AdjustStock, ExecutionError};

    #[tokio::test]
    async fn records_purchase() {
        let staff = fixtures::staff();
        let product = fixtures::product(100_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(staff.id, staff.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, mock) = fixtures::service(store);

        let movement = service
            .execute(AdjustStock {
                product_id: product.id,
                initiator_id: staff.id,
                kind: stock::Kind::Purchase,
                quantity: 20,
                note: stock::Note::new("Supplier delivery"),
            })
            .await
            .unwrap();

        assert_eq!(movement.before_quantity, 5);
        assert_eq!(movement.after_quantity, 25);

        let store = mock.snapshot().await;
        assert_eq!(store.products[&product.id].quantity, 25);
        assert_eq!(store.stock_movements.len(), 1);
    }

    #[tokio::test]
    async fn write_off_cannot_drive_stock_negative() {
        let staff = fixtures::staff();
        let product = fixtures::product(100_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(staff.id, staff.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, mock) = fixtures::service(store);

        let result = service
            .execute(AdjustStock {
                product_id: product.id,
                initiator_id: staff.id,
                kind: stock::Kind::Loss,
                quantity: -6,
                note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::InsufficientStock {
                available: 5,
                ..
            },
        ));
        assert_eq!(mock.snapshot().await.products[&product.id].quantity, 5);
    }

    #[tokio::test]
    async fn rejects_non_staff() {
        let user = fixtures::user();
        let product = fixtures::product(100_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, _) = fixtures::service(store);

        let result = service
            .execute(AdjustStock {
                product_id: product.id,
                initiator_id: user.id,
                kind: stock::Kind::Adjustment,
                quantity: 1,
                note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::UserNotStaff(_),
        ));
    }

    #[tokio::test]
    async fn rejects_manual_sale() {
        let staff = fixtures::staff();
        let product = fixtures::product(100_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(staff.id, staff.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, _) = fixtures::service(store);

        let result = service
            .execute(AdjustStock {
                product_id: product.id,
                initiator_id: staff.id,
                kind: stock::Kind::Sale,
                quantity: -1,
                note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::KindNotManual(stock::Kind::Sale),
        ));
    }
}
