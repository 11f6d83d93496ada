use crate::server::{AuthSettings, Result, ServerError};
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use inkwell_common::model::{
    Id,
    auth::{AuthToken, Authentication},
    user::UserMarker,
};
use inkwell_db::storage::{DynStorage, Storage};
use time::OffsetDateTime;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user a request was made by, proven by a bearer token.
///
/// Requests without an `Authorization` header are redirected to the login page. Handlers
/// that also serve anonymous visitors take an `Option<AuthenticatedUser>` instead.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }
}

fn requested_path(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_owned(), ToString::to_string)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    DynStorage: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header =
            <AuthorizationHeader as FromRequestParts<S>>::from_request_parts(parts, state).await;
        let header = match header {
            Ok(header) => header,
            Err(rejection) if rejection.is_missing() => {
                return Err(ServerError::LoginRequired {
                    next: requested_path(parts),
                });
            }
            Err(rejection) => return Err(ServerError::InvalidAuthorizationHeader(rejection)),
        };

        let request_token: AuthToken = header.token().parse()?;
        let token_hash = request_token.hash()?;

        let authentication = DynStorage::from_ref(state)
            .fetch_authentication(&token_hash)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        if authentication.user != request_token.user_id
            || authentication.is_expired_at(OffsetDateTime::now_utc())
        {
            return Err(ServerError::InvalidToken);
        }

        Ok(Self {
            id: authentication.user,
        })
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    DynStorage: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(None);
        }

        <Self as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

/// Creates and stores a fresh token for `user_id`.
pub async fn issue_token(
    storage: &dyn Storage,
    user_id: Id<UserMarker>,
    settings: AuthSettings,
) -> Result<AuthToken> {
    let token = AuthToken::generate_random(user_id);

    let authentication = Authentication {
        user: user_id,
        token_hash: token.hash()?,
        created_at: OffsetDateTime::now_utc(),
        expires_after: settings.token_lifetime,
    };
    storage.create_authentication(&authentication).await?;

    debug!(%user_id, "Issued auth token");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::{TestServer, location};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header::AUTHORIZATION},
    };

    #[tokio::test]
    async fn bearer_token_identifies_the_user() {
        let server = TestServer::new();
        let (_, token) = server.signed_up("leo").await;

        let (status, _) = server.get_json("/follow/", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = server.get_json("/profile/leo/", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["following"], false);
    }

    #[tokio::test]
    async fn missing_header_redirects_but_other_schemes_are_rejected() {
        let server = TestServer::new();

        let response = server.get("/follow/?page=2", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "/auth/login/?next=%2Ffollow%2F%3Fpage%3D2"
        );

        let request = Request::get("/follow/")
            .header(AUTHORIZATION, "Basic bGVvOnB3")
            .body(Body::empty())
            .unwrap();
        assert_eq!(server.send(request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let server = TestServer::new();
        let (user_id, _) = server.signed_up("leo").await;

        let forged = inkwell_common::model::auth::AuthToken::generate_random(user_id);
        let (status, body) = server
            .get_json("/follow/", Some(&forged.as_token_str()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
    }
}
