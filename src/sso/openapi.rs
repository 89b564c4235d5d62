use crate::sso::{
    error::ErrorBody,
    flow::{ExchangeResponse, ExchangeUser, MeResponse},
    handlers::{exchange, health, jwks, login, me, profile, register},
    models::{PublicUser, UserProfile},
    token::{Jwk, Jwks},
    validation::{ExchangeRequest, LoginRequest, ProfileRequest, RegisterRequest},
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        register::register,
        login::login,
        exchange::exchange,
        profile::profile,
        me::me,
        jwks::jwks,
    ),
    components(schemas(
        health::Health,
        ErrorBody,
        RegisterRequest,
        LoginRequest,
        ExchangeRequest,
        ProfileRequest,
        PublicUser,
        UserProfile,
        ExchangeResponse,
        ExchangeUser,
        MeResponse,
        profile::ProfileResponse,
        Jwks,
        Jwk,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "sso", description = "Single sign-on identity provider"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}
