use crate::sso::{
    error::ErrorBody,
    flow::{AuthFlow, MeResponse},
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/me",
    responses (
        (status = 200, description = "Authenticated identity and its permissions", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn me(headers: HeaderMap, flow: Extension<Arc<AuthFlow>>) -> impl IntoResponse {
    let identity = match flow.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    match flow.me(&identity).await {
        Ok(me) => (StatusCode::OK, Json(me)).into_response(),
        Err(err) => err.into_response(),
    }
}
