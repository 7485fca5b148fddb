//! [`Command`] for removing a [`Product`] from a [`Cart`].

use common::operations::{By, Delete, Select};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{cart, product, user, Cart, User},
    infra::{database, Database},
    Service,
};
#[cfg(doc)]
use crate::domain::Product;

use super::Command;

/// [`Command`] for removing a [`Product`]'s line from a [`User`]'s
/// [`Cart`] entirely.
#[derive(Clone, Copy, Debug)]
pub struct RemoveFromCart {
    /// ID of the [`User`] owning the [`Cart`].
    pub user_id: user::Id,

    /// ID of the [`Product`] to remove.
    pub product_id: product::Id,
}

impl<Db> Command<RemoveFromCart> for Service<Db>
where
    Db: Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Cart>, user::Id>>,
            Ok = Option<Cart>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<cart::Line>, (cart::Id, product::Id)>>,
            Ok = Option<cart::Line>,
            Err = Traced<database::Error>,
        > + Database<
            Delete<By<cart::Line, (cart::Id, product::Id)>>,
            Err = Traced<database::Error>,
        >,
{
    type Ok = ();
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: RemoveFromCart,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let RemoveFromCart {
            user_id,
            product_id,
        } = cmd;

        self.database()
            .execute(Select(By::<Option<User>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .filter(|u| u.deleted_at.is_none())
            .ok_or(E::UserNotExists(user_id))
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let cart = self
            .database()
            .execute(Select(By::<Option<Cart>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::LineNotExists(product_id))
            .map_err(tracerr::wrap!())?;

        self.database()
            .execute(Select(By::<Option<cart::Line>, _>::new((
                cart.id, product_id,
            ))))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::LineNotExists(product_id))
            .map_err(tracerr::wrap!())
            .map(drop)?;

        self.database()
            .execute(Delete(By::<cart::Line, _>::new((cart.id, product_id))))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(())
    }
}

/// Error of [`RemoveFromCart`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// No [`cart::Line`] exists for the [`Product`].
    #[display("No cart line exists for `Product(id: {_0})`")]
    LineNotExists(#[error(not(source))] product::Id),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    UserNotExists(#[error(not(source))] user::Id),
}
