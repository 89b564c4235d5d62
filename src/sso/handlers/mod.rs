//! HTTP handlers.
//!
//! Handlers stay thin: extract the request, call [`AuthFlow`], and map the
//! outcome to a status code. Every error body is an [`ErrorBody`].
//!
//! [`AuthFlow`]: crate::sso::flow::AuthFlow
//! [`ErrorBody`]: crate::sso::error::ErrorBody

pub mod exchange;
pub mod health;
pub mod jwks;
pub mod login;
pub mod me;
pub mod profile;
pub mod register;
pub mod root;

use crate::sso::error::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Response for a body that is absent or not valid JSON for the endpoint.
pub(crate) fn invalid_payload() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new("invalid payload")),
    )
        .into_response()
}
