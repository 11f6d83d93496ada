//! Body and query extractors that reject with [`ServerError`], so malformed input is
//! answered with the same JSON error body as everything else.

use crate::server::ServerError;
use axum::{
    extract::{FromRequest, FromRequestParts},
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::Serialize;

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        serde_json::to_vec(&self.0).map_or_else(
            |err| ServerError::JsonResponse(err).into_response(),
            |body| (TypedHeader(ContentType::json()), body).into_response(),
        )
    }
}

/// Query string parameters; unknown parameters are ignored.
#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct Query<T>(pub T);
