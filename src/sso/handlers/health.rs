//! Health probe.
//!
//! `GET /health` pings the credential store and the code store and reports
//! pool statistics. `OPTIONS /health` returns the same status and `X-App`
//! header without a body.

use crate::{
    sso::{code_store::CodeStore, flow::AuthFlow, store::CredentialStore},
    GIT_COMMIT_HASH,
};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};
use utoipa::ToSchema;

const HEALTH_CODE_STORE_TIMEOUT_SECONDS: u64 = 2;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    name: String,
    version: String,
    commit: String,
    status: String,
    database: String,
    code_store: String,
    open_connections: u32,
    in_use: u32,
    idle: u32,
}

fn up_or_down(up: bool) -> String {
    let status = if up { "up" } else { "down" };
    status.to_string()
}

async fn code_store_up(flow: &AuthFlow) -> bool {
    match timeout(
        Duration::from_secs(HEALTH_CODE_STORE_TIMEOUT_SECONDS),
        flow.codes().ping(),
    )
    .await
    {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!("Failed to ping code store: {}", err);
            false
        }
        Err(_) => {
            warn!("Code store health check timed out");
            false
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses (
        (status = 200, description = "Both stores are reachable", body = Health),
        (status = 503, description = "A store is unreachable", body = Health)
    ),
    tag = "health",
)]
pub async fn health(method: Method, flow: Extension<Arc<AuthFlow>>) -> impl IntoResponse {
    let (database, code_store) = tokio::join!(flow.store().health(), code_store_up(&flow));
    let healthy = database.up && code_store;

    let health = Health {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: GIT_COMMIT_HASH.to_string(),
        status: up_or_down(healthy),
        database: up_or_down(database.up),
        code_store: up_or_down(code_store),
        open_connections: database.open_connections,
        in_use: database.in_use,
        idle: database.idle,
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .map_err(|err| {
            debug!("Failed to parse X-App header: {}", err);
        })
        .unwrap_or_else(|()| HeaderMap::new());

    if healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
