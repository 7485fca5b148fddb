//! Inventory guard.
//!
//! [`reserve_and_decrement()`] and [`restock()`] are the only paths
//! mutating a [`Product`]'s on-hand quantity for a sale or its reversal.
//! Both run inside the caller's transaction, take exclusive row locks in
//! ascending [`product::Id`] order, and re-read every quantity under the
//! lock before touching it, so stock can never go negative under
//! concurrent checkouts and two multi-product operations cannot deadlock
//! on each other.

use common::{
    operations::{By, Insert, Lock, Select, Update},
    DateTime,
};
use derive_more::{Display, Error as StdError, From};
use tracerr::Traced;

use crate::{
    domain::{product, stock, user, Product},
    infra::{database, Database},
};

/// Demand of a single [`Product`] in some quantity.
#[derive(Clone, Copy, Debug)]
pub struct Demand {
    /// ID of the demanded [`Product`].
    pub product_id: product::Id,

    /// Number of units demanded.
    pub quantity: product::Quantity,
}

/// Verifies and decrements on-hand stock for all the provided `demands`,
/// recording one [`stock::Kind::Sale`] [`stock::Movement`] per product.
///
/// Either every demand is satisfied or nothing is decremented: the first
/// product short on stock aborts the whole operation, and the enclosing
/// transaction rolls the rest back.
///
/// Not idempotent: invoking it twice decrements twice, so callers must
/// guarantee at most one invocation per order.
///
/// # Errors
///
/// - [`Error::InsufficientStock`] if any demand exceeds the stock observed
///   under the row lock.
/// - [`Error::ProductNotExists`] if a demanded product vanished.
/// - [`Error::Db`] if a [`Database`] operation fails.
pub async fn reserve_and_decrement<Db>(
    tx: &Db,
    demands: &[Demand],
    caused_by: Option<user::Id>,
    note: Option<stock::Note>,
) -> Result<(), Traced<Error>>
where
    Db: Database<
            Lock<By<Product, product::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Product>, product::Id>>,
            Ok = Option<Product>,
            Err = Traced<database::Error>,
        > + Database<Update<Product>, Err = Traced<database::Error>>
        + Database<Insert<stock::Movement>, Err = Traced<database::Error>>,
{
    use Error as E;

    let mut demands = demands.to_vec();
    demands.sort_unstable_by_key(|d| d.product_id);

    let mut checked = Vec::with_capacity(demands.len());
    for Demand {
        product_id,
        quantity,
    } in demands
    {
        tx.execute(Lock(By::new(product_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        // A quantity read before the lock was acquired cannot be trusted.
        let product = tx
            .execute(Select(By::<Option<Product>, _>::new(product_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ProductNotExists(product_id))
            .map_err(tracerr::wrap!())?;

        if product.quantity < quantity {
            return Err(tracerr::new!(E::InsufficientStock {
                product_id,
                available: product.quantity,
            }));
        }

        checked.push((product, quantity));
    }

    for (mut product, quantity) in checked {
        let before = product.quantity;
        product.quantity = before - quantity;

        tx.execute(Update(product.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        tx.execute(Insert(stock::Movement {
            id: stock::Id::new(),
            product_id: product.id,
            kind: stock::Kind::Sale,
            quantity: -i32::try_from(quantity).expect("`quantity` overflow"),
            before_quantity: before,
            after_quantity: product.quantity,
            note: note.clone(),
            created_by: caused_by,
            created_at: DateTime::now().coerce(),
        }))
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))
        .map(drop)?;
    }

    Ok(())
}

/// Returns previously decremented units back to stock, recording one
/// [`stock::Movement`] of the provided `kind` per product.
///
/// Used by cancellation, return and pre-payment deletion paths.
///
/// # Errors
///
/// - [`Error::ProductNotExists`] if a product vanished from the catalog.
/// - [`Error::Db`] if a [`Database`] operation fails.
pub async fn restock<Db>(
    tx: &Db,
    demands: &[Demand],
    kind: stock::Kind,
    caused_by: Option<user::Id>,
    note: Option<stock::Note>,
) -> Result<(), Traced<Error>>
where
    Db: Database<
            Lock<By<Product, product::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Product>, product::Id>>,
            Ok = Option<Product>,
            Err = Traced<database::Error>,
        > + Database<Update<Product>, Err = Traced<database::Error>>
        + Database<Insert<stock::Movement>, Err = Traced<database::Error>>,
{
    use Error as E;

    let mut demands = demands.to_vec();
    demands.sort_unstable_by_key(|d| d.product_id);

    for Demand {
        product_id,
        quantity,
    } in demands
    {
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
        product.quantity = before
            .checked_add(quantity)
            .expect("`quantity` overflow");

        tx.execute(Update(product.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        tx.execute(Insert(stock::Movement {
            id: stock::Id::new(),
            product_id: product.id,
            kind,
            quantity: i32::try_from(quantity).expect("`quantity` overflow"),
            before_quantity: before,
            after_quantity: product.quantity,
            note: note.clone(),
            created_by: caused_by,
            created_at: DateTime::now().coerce(),
        }))
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))
        .map(drop)?;
    }

    Ok(())
}

/// Error of an inventory guard operation.
#[derive(Debug, Display, StdError, From)]
pub enum Error {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// A [`Product`] is short on on-hand stock.
    #[display(
        "`Product(id: {product_id})` has only {available} unit(s) in stock"
    )]
    InsufficientStock {
        /// ID of the short [`Product`].
        product_id: product::Id,

        /// Units actually available.
        available: product::Quantity,
    },

    /// [`Product`] with the provided ID does not exist.
    #[display("`Product(id: {_0})` does not exist")]
    ProductNotExists(#[error(not(source))] product::Id),
}
