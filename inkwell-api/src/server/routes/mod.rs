use crate::server::{ServerError, ServerRouter, extract::Json};
use axum::{
    Router,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

mod follows;
mod groups;
mod posts;
mod profiles;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(posts::routes())
        .merge(groups::routes())
        .merge(profiles::routes())
        .merge(follows::routes())
        .merge(users::routes())
}

/// The `?page=` parameter of every feed. Kept raw; the paginator decides what it means.
///
/// A repeated parameter is not an error, the last occurrence wins.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
struct PageQuery {
    page: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for PageQuery {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(parts.uri.query().unwrap_or_default())
                .map_err(ServerError::MalformedQuery)?;

        let page = pairs
            .into_iter()
            .rev()
            .find_map(|(key, value)| (key == "page").then_some(value));

        Ok(Self { page })
    }
}

/// Result of submitting a form: either the form again with messages, or a redirect.
enum FormOutcome<T> {
    Invalid(T),
    Redirect(String),
}

impl<T: Serialize> IntoResponse for FormOutcome<T> {
    fn into_response(self) -> Response {
        match self {
            FormOutcome::Invalid(form) => (StatusCode::BAD_REQUEST, Json(form)).into_response(),
            FormOutcome::Redirect(location) => Redirect::to(&location).into_response(),
        }
    }
}
