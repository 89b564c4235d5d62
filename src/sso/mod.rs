//! Single sign-on identity provider.
//!
//! Users register into a self-registrable role, log in with a redirect URL,
//! and the client trades the one-time code it receives for an RS256 token.
//! Relying services verify tokens offline against `/.well-known/jwks.json`.

pub mod catalog;
pub mod code_store;
pub mod config;
pub mod error;
pub mod flow;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod password;
pub mod store;
pub mod token;
pub mod validation;

use crate::sso::{
    catalog::{seed, RoleCatalog},
    code_store::RedisCodeStore,
    config::ServerConfig,
    flow::{AuthFlow, RedirectPolicy},
    handlers::{exchange, health, jwks, login, me, profile, register, root},
    store::{apply_schema, PgCredentialStore},
    token::TokenService,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, warn, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

/// Build the HTTP router around a ready [`AuthFlow`].
#[must_use]
pub fn router(flow: Arc<AuthFlow>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .route("/register/:role", post(register::register))
        .route("/login", post(login::login))
        .route("/exchange", post(exchange::exchange))
        .route("/profile", post(profile::profile))
        .route("/me", get(me::me))
        .route("/.well-known/jwks.json", get(jwks::jwks))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(flow)),
        )
}

fn load_tokens(config: &ServerConfig) -> Result<TokenService> {
    let private_pem = std::fs::read(config.private_key_path()).with_context(|| {
        format!(
            "Failed to read RSA private key: {}",
            config.private_key_path().display()
        )
    })?;
    let public_pem = std::fs::read(config.public_key_path()).with_context(|| {
        format!(
            "Failed to read RSA public key: {}",
            config.public_key_path().display()
        )
    })?;

    TokenService::from_pem(&private_pem, &public_pem).context("Invalid RSA key pair")
}

fn load_catalog(config: &ServerConfig) -> Result<RoleCatalog> {
    let catalog = match config.catalog_path() {
        Some(path) => RoleCatalog::from_json_file(path)?,
        None => RoleCatalog::default(),
    };
    catalog.validate()?;
    Ok(catalog)
}

fn load_redirects(config: &ServerConfig) -> Result<RedirectPolicy> {
    let policy = RedirectPolicy::from_origins(config.allowed_redirects())
        .context("Invalid entry in redirect allow-list")?;

    if policy.is_open() {
        warn!("No redirect allow-list configured, any absolute http(s) redirect_url is accepted");
    }

    Ok(policy)
}

/// Start the server.
///
/// # Errors
/// Returns an error if keys, catalog, database or code store can't be set
/// up, or the listener fails.
pub async fn new(config: ServerConfig) -> Result<()> {
    let tokens = Arc::new(load_tokens(&config)?);
    info!(kid = tokens.kid(), "Signing key loaded");

    let catalog = Arc::new(load_catalog(&config)?);
    let redirects = load_redirects(&config)?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect_with(config.database().connect_options())
        .await
        .context("Failed to connect to database")?;

    apply_schema(&pool)
        .await
        .context("Failed to apply database schema")?;

    let store = Arc::new(PgCredentialStore::new(pool));

    let codes = Arc::new(
        RedisCodeStore::connect(config.redis_url(), config.redis_password())
            .await
            .context("Failed to connect to code store")?,
    );

    seed(store.as_ref(), &catalog, config.admin())
        .await
        .context("Failed to seed roles")?;

    let flow = Arc::new(AuthFlow::new(store, codes, tokens, catalog, redirects));
    let app = router(flow);

    let port = config.port();
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sso::flow::tests::{fixture, Fixture};
    use anyhow::anyhow;
    use axum::{body::to_bytes, http::StatusCode, response::Response};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, request: Request<Body>) -> Result<Response> {
        Ok(app.clone().oneshot(request).await?)
    }

    fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
        Ok(Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body)?))?)
    }

    fn get(uri: &str) -> Result<Request<Body>> {
        Ok(Request::builder().uri(uri).body(Body::empty())?)
    }

    async fn json_body(response: Response) -> Result<Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn registration(email: &str) -> Value {
        json!({
            "fullname": "Grace Hopper",
            "email": email,
            "password": "Abcd1234!",
            "password_confirm": "Abcd1234!",
        })
    }

    async fn app() -> Result<(Router, Fixture)> {
        let fixture = fixture().await?;
        Ok((router(fixture.flow.clone()), fixture))
    }

    /// Register, log in and exchange; returns the bearer token.
    async fn sign_in(app: &Router, email: &str) -> Result<String> {
        let response = send(app, post_json("/register/reader", &registration(email))?).await?;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(
            app,
            post_json(
                "/login?redirect_url=https://app.example.com/callback",
                &json!({"email": email, "password": "Abcd1234!"}),
            )?,
        )
        .await?;
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("missing Location"))?;
        let url = url::Url::parse(location)?;
        let code = url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| anyhow!("missing code"))?;

        let response = send(app, post_json("/exchange", &json!({"code": code}))?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        body["token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("missing token"))
    }

    #[tokio::test]
    async fn root_reports_name_and_version() -> Result<()> {
        let (app, _) = app().await?;
        let response = send(&app, get("/")?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let text = String::from_utf8(bytes.to_vec())?;
        assert!(text.starts_with(env!("CARGO_PKG_NAME")));
        assert!(text.contains(env!("CARGO_PKG_VERSION")));
        Ok(())
    }

    #[tokio::test]
    async fn register_statuses() -> Result<()> {
        let (app, fixture) = app().await?;

        let response = send(&app, post_json("/register/reader", &registration("a@b.io"))?).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await?;
        assert_eq!(body["email"], "a@b.io");
        assert!(body.get("password_hash").is_none());

        let response = send(&app, post_json("/register/reader", &registration("a@b.io"))?).await?;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(
            &app,
            post_json("/register/Administrator", &registration("c@d.io"))?,
        )
        .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let mut weak = registration("e@f.io");
        weak["password"] = json!("short");
        weak["password_confirm"] = json!("short");
        let response = send(&app, post_json("/register/editor", &weak)?).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await?;
        assert!(body["errors"]["password"].is_string());

        // the registered reader and the seeded administrator
        assert_eq!(fixture.store.user_count().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_payload_is_bad_request() -> Result<()> {
        let (app, _) = app().await?;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/exchange")
            .body(Body::empty())?;
        let response = send(&app, request).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await?;
        assert_eq!(body["message"], "invalid payload");
        Ok(())
    }

    #[tokio::test]
    async fn login_redirects_with_code() -> Result<()> {
        let (app, fixture) = app().await?;
        send(&app, post_json("/register/reader", &registration("a@b.io"))?).await?;

        let response = send(
            &app,
            post_json(
                "/login?redirect_url=https://app.example.com/cb?state=xyz",
                &json!({"email": "a@b.io", "password": "Abcd1234!"}),
            )?,
        )
        .await?;
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("missing Location"))?;
        let url = url::Url::parse(location)?;
        assert_eq!(url.host_str(), Some("app.example.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
        let code = pairs
            .iter()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.clone())
            .ok_or_else(|| anyhow!("missing code"))?;
        assert_eq!(code.len(), 36);
        assert_eq!(fixture.codes.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn login_failures_are_bad_requests() -> Result<()> {
        let (app, fixture) = app().await?;
        send(&app, post_json("/register/reader", &registration("a@b.io"))?).await?;

        for body in [
            json!({"email": "a@b.io", "password": "Wrong1234!"}),
            json!({"email": "nobody@b.io", "password": "Abcd1234!"}),
        ] {
            let response = send(
                &app,
                post_json("/login?redirect_url=https://app.example.com/", &body)?,
            )
            .await?;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = json_body(response).await?;
            assert_eq!(body["message"], "invalid credentials");
        }

        let response = send(
            &app,
            post_json(
                "/login",
                &json!({"email": "a@b.io", "password": "Abcd1234!"}),
            )?,
        )
        .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(fixture.codes.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn exchange_unknown_code() -> Result<()> {
        let (app, _) = app().await?;
        let response = send(&app, post_json("/exchange", &json!({"code": "deadbeef"}))?).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn full_flow_profile_and_me() -> Result<()> {
        let (app, _) = app().await?;
        let token = sign_in(&app, "a@b.io").await?;
        let bearer = format!("Bearer {token}");

        let response = send(
            &app,
            post_json("/profile", &json!({"fullname": "Grace Hopper"}))?,
        )
        .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = post_json("/profile", &json!({"fullname": "Grace Hopper"}))?;
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_str(&bearer)?);
        let response = send(&app, request).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await?;
        assert_eq!(body["message"], "profile updated");
        assert_eq!(body["profile"]["full_name"], "Grace Hopper");

        let request = Request::builder()
            .uri("/me")
            .header(header::AUTHORIZATION, bearer.as_str())
            .body(Body::empty())?;
        let response = send(&app, request).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert_eq!(body["email"], "a@b.io");
        assert_eq!(body["role"], "Reader");
        assert_eq!(body["permissions"], json!(["blog:read"]));
        assert_eq!(body["full_name"], "Grace Hopper");

        let response = send(&app, get("/me")?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn jwks_is_cacheable() -> Result<()> {
        let (app, fixture) = app().await?;
        let response = send(&app, get("/.well-known/jwks.json")?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok()),
            Some("public, max-age=300")
        );
        let body = json_body(response).await?;
        assert_eq!(body["keys"][0]["kid"], fixture.flow.tokens().kid());
        assert_eq!(body["keys"][0]["alg"], "RS256");
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_up() -> Result<()> {
        let (app, _) = app().await?;
        let response = send(&app, get("/health")?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-app"));
        let body = json_body(response).await?;
        assert_eq!(body["status"], "up");
        assert_eq!(body["database"], "up");
        assert_eq!(body["code_store"], "up");

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/health")
            .body(Body::empty())?;
        let response = send(&app, request).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        assert!(bytes.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn request_id_is_propagated() -> Result<()> {
        let (app, _) = app().await?;

        let request = Request::builder()
            .uri("/")
            .header("x-request-id", "req-123")
            .body(Body::empty())?;
        let response = send(&app, request).await?;
        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("req-123")
        );

        let response = send(&app, get("/")?).await?;
        let generated = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("missing x-request-id"))?;
        assert_eq!(generated.len(), 26);
        Ok(())
    }

    #[tokio::test]
    async fn openapi_is_served() -> Result<()> {
        let (app, _) = app().await?;
        let response = send(&app, get("/api-docs/openapi.json")?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert!(body["paths"]["/login"].is_object());
        Ok(())
    }
}
