//! [`Command`] for clearing a [`Cart`].

use common::operations::{By, Delete, Select};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{cart, user, Cart, User},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for deleting all lines of a [`User`]'s [`Cart`].
///
/// A missing cart is not an error: the outcome (an empty cart) is the
/// same.
#[derive(Clone, Copy, Debug)]
pub struct ClearCart {
    /// ID of the [`User`] owning the [`Cart`].
    pub user_id: user::Id,
}

impl<Db> Command<ClearCart> for Service<Db>
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
            Delete<By<cart::Line, cart::Id>>,
            Err = Traced<database::Error>,
        >,
{
    type Ok = ();
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: ClearCart) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ClearCart { user_id } = cmd;

        self.database()
            .execute(Select(By::<Option<User>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .filter(|u| u.deleted_at.is_none())
            .ok_or(E::UserNotExists(user_id))
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let Some(cart) = self
            .database()
            .execute(Select(By::<Option<Cart>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
        else {
            return Ok(());
        };

        self.database()
            .execute(Delete(By::<cart::Line, _>::new(cart.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(())
    }
}

/// Error of [`ClearCart`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    UserNotExists(#[error(not(source))] user::Id),
}

#[cfg(test)]
mod spec {
    use common::Handler as _;

    use crate::{
        command::AddToCart,
        infra::database::mock::{fixtures, Store},
    };

    use super::ClearCart;

    #[tokio::test]
    async fn deletes_all_lines() {
        let user = fixtures::user();
        let a = fixtures::product(100_000, 10);
        let b = fixtures::product(50_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        drop(store.products.insert(a.id, a.clone()));
        drop(store.products.insert(b.id, b.clone()));
        let (service, mock) = fixtures::service(store);

        for product_id in [a.id, b.id] {
            drop(
                service
                    .execute(AddToCart {
                        user_id: user.id,
                        product_id,
                        quantity: 1,
                    })
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(mock.snapshot().await.cart_lines.len(), 2);

        service
            .execute(ClearCart { user_id: user.id })
            .await
            .unwrap();

        assert!(mock.snapshot().await.cart_lines.is_empty());
    }

    #[tokio::test]
    async fn missing_cart_is_no_op() {
        let user = fixtures::user();
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        let (service, _) = fixtures::service(store);

        service
            .execute(ClearCart { user_id: user.id })
            .await
            .unwrap();
    }
}
