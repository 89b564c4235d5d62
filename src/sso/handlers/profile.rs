use crate::sso::{
    error::ErrorBody, flow::AuthFlow, models::UserProfile, validation::ProfileRequest,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Debug)]
pub struct ProfileResponse {
    message: String,
    profile: UserProfile,
}

#[utoipa::path(
    post,
    path = "/profile",
    request_body = ProfileRequest,
    responses (
        (status = 201, description = "Profile created", body = ProfileResponse, content_type = "application/json"),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 409, description = "Profile already exists", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
#[instrument(skip_all)]
pub async fn profile(
    headers: HeaderMap,
    flow: Extension<Arc<AuthFlow>>,
    payload: Option<Json<ProfileRequest>>,
) -> impl IntoResponse {
    let identity = match flow.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return super::invalid_payload();
    };

    match flow.create_profile(&identity, request).await {
        Ok(profile) => (
            StatusCode::CREATED,
            Json(ProfileResponse {
                message: "profile updated".to_string(),
                profile,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
