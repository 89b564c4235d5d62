use crate::sso::{
    error::ErrorBody, flow::AuthFlow, models::PublicUser, validation::RegisterRequest,
};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/register/{role}",
    params(
        ("role" = String, Path, description = "Self-registrable role slug, e.g. `reader` or `editor`")
    ),
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "Registration successful", body = PublicUser, content_type = "application/json"),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 404, description = "Unknown role", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    tag = "register"
)]
#[instrument(skip_all, fields(role = %role))]
pub async fn register(
    Path(role): Path<String>,
    flow: Extension<Arc<AuthFlow>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return super::invalid_payload();
    };

    match flow.register(&role, request).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}
