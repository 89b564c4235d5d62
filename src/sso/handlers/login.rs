use crate::sso::{error::ErrorBody, flow::AuthFlow, validation::LoginRequest};
use axum::{
    extract::{Extension, Query},
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct LoginQuery {
    /// Absolute http(s) URL the browser is sent back to with `?code=`.
    redirect_url: Option<String>,
}

#[utoipa::path(
    post,
    path = "/login",
    params(LoginQuery),
    request_body = LoginRequest,
    responses (
        (status = 302, description = "Credentials accepted, redirect to `redirect_url?code=<code>`"),
        (status = 400, description = "Invalid payload, redirect or credentials", body = ErrorBody),
    ),
    tag = "login"
)]
#[instrument(skip_all)]
pub async fn login(
    Query(query): Query<LoginQuery>,
    flow: Extension<Arc<AuthFlow>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return super::invalid_payload();
    };

    match flow.login(request, query.redirect_url.as_deref()).await {
        Ok(target) => (StatusCode::FOUND, [(LOCATION, target.to_string())]).into_response(),
        Err(err) => err.into_response(),
    }
}
