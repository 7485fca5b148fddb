//! [`Command`] for changing the quantity of a [`cart::Line`].

use common::{
    operations::{By, Select, Update},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{cart, product, user, Cart, Product, User},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for overwriting the quantity of a [`Product`] already in a
/// [`User`]'s [`Cart`].
#[derive(Clone, Copy, Debug)]
pub struct UpdateCartLine {
    /// ID of the [`User`] owning the [`Cart`].
    pub user_id: user::Id,

    /// ID of the [`Product`] whose line to update.
    pub product_id: product::Id,

    /// New number of units.
    pub quantity: product::Quantity,
}

impl<Db> Command<UpdateCartLine> for Service<Db>
where
    Db: Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Product>, product::Id>>,
            Ok = Option<Product>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Cart>, user::Id>>,
            Ok = Option<Cart>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<cart::Line>, (cart::Id, product::Id)>>,
            Ok = Option<cart::Line>,
            Err = Traced<database::Error>,
        > + Database<Update<cart::Line>, Err = Traced<database::Error>>,
{
    type Ok = cart::Line;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: UpdateCartLine,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let UpdateCartLine {
            user_id,
            product_id,
            quantity,
        } = cmd;

        if quantity < 1 {
            return Err(tracerr::new!(E::InvalidQuantity(quantity)));
        }

        self.database()
            .execute(Select(By::<Option<User>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .filter(|u| u.deleted_at.is_none())
            .ok_or(E::UserNotExists(user_id))
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let product = self
            .database()
            .execute(Select(By::<Option<Product>, _>::new(product_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ProductNotExists(product_id))
            .map_err(tracerr::wrap!())?;
        if !product.is_active {
            return Err(tracerr::new!(E::ProductUnavailable(product_id)));
        }
        if quantity > product.quantity {
            return Err(tracerr::new!(E::InsufficientStock {
                product_id,
                available: product.quantity,
            }));
        }

        let cart = self
            .database()
            .execute(Select(By::<Option<Cart>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::LineNotExists(product_id))
            .map_err(tracerr::wrap!())?;

        let mut line = self
            .database()
            .execute(Select(By::<Option<cart::Line>, _>::new((
                cart.id, product_id,
            ))))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::LineNotExists(product_id))
            .map_err(tracerr::wrap!())?;

        line.quantity = quantity;
        line.updated_at = DateTime::now().coerce();
        self.database()
            .execute(Update(line.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(line)
    }
}

/// Error of [`UpdateCartLine`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Requested quantity is not a positive number.
    #[display("Quantity of {_0} unit(s) is invalid")]
    InvalidQuantity(#[error(not(source))] product::Quantity),

    /// [`Product`] is short on on-hand stock.
    #[display(
        "`Product(id: {product_id})` has only {available} unit(s) in stock"
    )]
    InsufficientStock {
        /// ID of the short [`Product`].
        product_id: product::Id,

        /// Units actually available.
        available: product::Quantity,
    },

    /// No [`cart::Line`] exists for the [`Product`].
    #[display("No cart line exists for `Product(id: {_0})`")]
    LineNotExists(#[error(not(source))] product::Id),

    /// [`Product`] with the provided ID does not exist.
    #[display("`Product(id: {_0})` does not exist")]
    ProductNotExists(#[error(not(source))] product::Id),

    /// [`Product`] is not active.
    #[display("`Product(id: {_0})` is not available")]
    ProductUnavailable(#[error(not(source))] product::Id),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    UserNotExists(#[error(not(source))] user::Id),
}
