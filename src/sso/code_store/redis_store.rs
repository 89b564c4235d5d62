use super::{code_key, CodeStore, CodeStoreError};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, ConnectionInfo, IntoConnectionInfo};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{info_span, Instrument};

/// Redis backed code store (`SET key value EX ttl` / `GETDEL key`).
#[derive(Clone)]
pub struct RedisCodeStore {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisCodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCodeStore").finish_non_exhaustive()
    }
}

/// Accept both `host:port` and full `redis://` / `rediss://` URLs.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("redis://{url}")
    }
}

fn connection_info(
    url: &str,
    password: Option<&SecretString>,
) -> Result<ConnectionInfo, CodeStoreError> {
    let mut info = normalize_url(url).into_connection_info()?;

    if let Some(password) = password {
        let password = password.expose_secret();
        if !password.is_empty() {
            info.redis.password = Some(password.to_string());
        }
    }

    Ok(info)
}

impl RedisCodeStore {
    /// Connect and keep a self-reconnecting connection manager.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn connect(
        url: &str,
        password: Option<&SecretString>,
    ) -> Result<Self, CodeStoreError> {
        let client = Client::open(connection_info(url, password)?)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn put(&self, code: &str, user_id: &str, ttl: Duration) -> Result<(), CodeStoreError> {
        let span = info_span!("redis.command", db.system = "redis", db.operation = "SET");
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(code_key(code), user_id, ttl.as_secs())
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn take(&self, code: &str) -> Result<Option<String>, CodeStoreError> {
        let span = info_span!("redis.command", db.system = "redis", db.operation = "GETDEL");
        let mut conn = self.manager.clone();
        let user_id: Option<String> = conn.get_del(code_key(code)).instrument(span).await?;
        Ok(user_id)
    }

    async fn ping(&self) -> Result<(), CodeStoreError> {
        let span = info_span!("redis.command", db.system = "redis", db.operation = "PING");
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .instrument(span)
            .await?;
        Ok(())
    }
}
