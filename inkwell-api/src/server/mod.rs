use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use inkwell_common::model::{
    Id,
    auth::{AuthTokenDecodeError, HashError, PositiveDuration},
    post::PostMarker,
};
use inkwell_db::storage::{DbError, DynStorage};
use extract::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

pub use cache::IndexCache;

mod auth;
mod cache;
mod extract;
mod routes;
#[cfg(test)]
mod test_support;

pub type ServerRouter = Router<ServerState>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct AuthSettings {
    /// How long issued tokens stay valid; `None` means forever.
    pub token_lifetime: Option<PositiveDuration>,
}

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub storage: DynStorage,
    pub index_cache: IndexCache,
    pub auth_settings: AuthSettings,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Query string could not be parsed: {0}")]
    MalformedQuery(serde_urlencoded::de::Error),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Form body could not be parsed: {0}")]
    FormBody(serde_json::Error),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Login required to access {next}")]
    LoginRequired { next: String },
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error("Username or password was wrong")]
    InvalidCredentials,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User {0:?} was not found.")]
    UserByUsernameNotFound(String),
    #[error("Group {0:?} was not found.")]
    GroupBySlugNotFound(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByUsernameNotFound(_)
            | ServerError::GroupBySlugNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::LoginRequired { .. } => StatusCode::SEE_OTHER,
            ServerError::InvalidToken | ServerError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::QueryRejection(_)
            | ServerError::MalformedQuery(_)
            | ServerError::JsonRejection(_)
            | ServerError::FormBody(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_) => StatusCode::BAD_REQUEST,
            ServerError::Database(
                DbError::UsernameTaken(_)
                | DbError::GroupSlugTaken(_)
                | DbError::MissingReference(_),
            ) => StatusCode::CONFLICT,
            ServerError::JsonResponse(_) | ServerError::Database(_) | ServerError::Hash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Where anonymous visitors of login-only pages are sent.
pub fn login_url(next: &str) -> String {
    serde_urlencoded::to_string([("next", next)])
        .map_or_else(|_| "/auth/login/".to_owned(), |query| format!("/auth/login/?{query}"))
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
struct ErrorResponse<'a> {
    status: u16,
    reason: &'a str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let ServerError::LoginRequired { next } = &self {
            debug!(%next, "Redirecting anonymous user to login");
            return Redirect::to(&login_url(next)).into_response();
        }

        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default(),
        };
        (status, Json(error_response)).into_response()
    }
}
