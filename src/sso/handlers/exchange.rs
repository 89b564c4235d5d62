use crate::sso::{
    error::ErrorBody,
    flow::{AuthFlow, ExchangeResponse},
    validation::ExchangeRequest,
};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/exchange",
    request_body = ExchangeRequest,
    responses (
        (status = 200, description = "Code redeemed", body = ExchangeResponse, content_type = "application/json"),
        (status = 400, description = "Invalid or expired code", body = ErrorBody),
        (status = 500, description = "User or token could not be resolved", body = ErrorBody),
    ),
    tag = "exchange"
)]
#[instrument(skip_all)]
pub async fn exchange(
    flow: Extension<Arc<AuthFlow>>,
    payload: Option<Json<ExchangeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return super::invalid_payload();
    };

    match flow.exchange_code(&request.code).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}
