use super::{token::TokenError, validation::FieldErrors};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Failures surfaced by the auth flow, each mapped to one HTTP status.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation error")]
    Validation(FieldErrors),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Conflict(String),
    #[error("invalid or expired code")]
    CodeInvalidOrExpired,
    #[error("redirect_url must be an absolute http(s) URL")]
    InvalidRedirect,
    #[error("redirect_url is not allowed")]
    RedirectNotAllowed,
    #[error("role not found: {0}")]
    UnknownRole(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("user not found")]
    UserNotFound,
    #[error("token issuance failed: {0}")]
    TokenIssuanceFailed(#[source] TokenError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InvalidCredentials
            | Self::CodeInvalidOrExpired
            | Self::InvalidRedirect
            | Self::RedirectNotAllowed => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnknownRole(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UserNotFound
            | Self::TokenIssuanceFailed(_)
            | Self::Configuration(_)
            | Self::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body of every error response.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = if status.is_server_error() {
            error!("{self}");
            ErrorBody::new(INTERNAL_ERROR_MESSAGE)
        } else {
            match self {
                Self::Validation(errors) => ErrorBody {
                    message: "validation error".to_string(),
                    errors: Some(errors),
                },
                other => ErrorBody::new(other.to_string()),
            }
        };

        (status, Json(body)).into_response()
    }
}
