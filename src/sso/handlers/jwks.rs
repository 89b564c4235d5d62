use crate::sso::{flow::AuthFlow, token::Jwks};
use axum::{
    extract::Extension,
    http::header::CACHE_CONTROL,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses (
        (status = 200, description = "Public key used to verify issued tokens", body = Jwks),
    ),
    tag = "jwks"
)]
// keys never rotate while the process runs
pub async fn jwks(flow: Extension<Arc<AuthFlow>>) -> impl IntoResponse {
    (
        [(CACHE_CONTROL, "public, max-age=300")],
        Json(flow.tokens().jwks()),
    )
}
