//! [`Command`] for authorizing a [`User`].

use common::operations::{By, Select};
use derive_more::{Display, Error, From};
use jsonwebtoken::Validation;
use tracerr::Traced;

use crate::{
    domain::{
        user::{self, session, Session},
        User,
    },
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for authorizing a [`User`] by a [`Session`] token.
///
/// This is the only gate between the anonymous web surface and the
/// user-scoped operations: everything downstream takes an explicit
/// [`user::Id`] proven here.
#[derive(Clone, Debug, From)]
pub struct AuthorizeSession {
    /// [`Session`] token to authorize.
    pub token: session::Token,
}

impl<Db> Command<AuthorizeSession> for Service<Db>
where
    Db: Database<
        Select<By<Option<User>, user::Id>>,
        Ok = Option<User>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Session;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: AuthorizeSession,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let AuthorizeSession { token } = cmd;

        let session = jsonwebtoken::decode::<Session>(
            token.as_ref(),
            &self.config().jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(tracerr::from_and_wrap!(=> E))?
        .claims;

        drop(
            self.database()
                .execute(Select(By::new(session.user_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .filter(|u| u.deleted_at.is_none())
                .ok_or(E::UserNotExists(session.user_id))
                .map_err(tracerr::wrap!())?,
        );

        Ok(session)
    }
}

/// Error of [`AuthorizeSession`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`jsonwebtoken`] decoding error.
    #[display("Failed to decode a JSON Web Token: {_0}")]
    JsonWebTokenDecodeError(jsonwebtoken::errors::Error),

    /// [`User`] the [`Session`] belongs to does not exist.
    #[display("`User(id: {_0})` does not exist")]
    #[from(ignore)]
    UserNotExists(#[error(not(source))] user::Id),
}

#[cfg(test)]
mod spec {
    use common::{DateTime, Handler as _};
    use jsonwebtoken::{EncodingKey, Header};

    use crate::{
        domain::user::{session, Session},
        infra::database::mock::{fixtures, Store},
    };

    use super::{AuthorizeSession, ExecutionError};

    fn token(session: &Session) -> session::Token {
        let encoded = jsonwebtoken::encode(
            &Header::default(),
            session,
            &EncodingKey::from_secret(fixtures::JWT_SECRET),
        )
        .unwrap();
        encoded.parse().unwrap()
    }

    #[tokio::test]
    async fn authorizes_valid_token() {
        let user = fixtures::user();
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        let (service, _) = fixtures::service(store);

        let session = Session {
            user_id: user.id,
            expires_at: DateTime::now().coerce()
                + std::time::Duration::from_secs(3600),
        };

        let authorized = service
            .execute(AuthorizeSession {
                token: token(&session),
            })
            .await
            .unwrap();

        assert_eq!(authorized.user_id, user.id);
    }

    #[tokio::test]
    async fn rejects_garbage_token() {
        let (service, _) = fixtures::service(Store::default());

        let result = service
            .execute(AuthorizeSession {
                token: "not-a-jwt".parse().unwrap(),
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::JsonWebTokenDecodeError(_),
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_user() {
        let (service, _) = fixtures::service(Store::default());

        let session = Session {
            user_id: crate::domain::user::Id::new(),
            expires_at: DateTime::now().coerce()
                + std::time::Duration::from_secs(3600),
        };

        let result = service
            .execute(AuthorizeSession {
                token: token(&session),
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::UserNotExists(_),
        ));
    }
}
