use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool};
use sso::sso::config::DatabaseConfig;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::time::{sleep, Duration};

const POSTGRES_PORT: u16 = 5432;
const REDIS_PORT: u16 = 6379;

const DB_USER: &str = "sso";
const DB_PASSWORD: &str = "sso";
const DB_NAME: &str = "sso";

pub struct PostgresContainer {
    _container: ContainerAsync<GenericImage>,
    host_port: u16,
}

impl PostgresContainer {
    /// # Errors
    /// Returns an error if the container fails to start or the port cannot be resolved.
    pub async fn start() -> Result<Self> {
        let container = GenericImage::new("postgres", "17")
            .with_exposed_port(POSTGRES_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", DB_USER)
            .with_env_var("POSTGRES_PASSWORD", DB_PASSWORD)
            .with_env_var("POSTGRES_DB", DB_NAME)
            .start()
            .await
            .context("Failed to start Postgres container")?;
        let host_port = container
            .get_host_port_ipv4(POSTGRES_PORT.tcp())
            .await
            .context("Failed to resolve Postgres host port")?;

        Ok(Self {
            _container: container,
            host_port,
        })
    }

    #[must_use]
    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(
            "127.0.0.1".to_string(),
            DB_USER.to_string(),
            SecretString::from(DB_PASSWORD.to_string()),
            DB_NAME.to_string(),
        )
        .with_port(self.host_port)
    }

    /// Connect a pool, retrying until the server accepts TCP connections.
    ///
    /// # Errors
    /// Returns an error if Postgres does not become ready after retries.
    pub async fn pool(&self) -> Result<PgPool> {
        let options = self.database().connect_options();
        let mut attempts = 0;

        loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .connect_with(options.clone())
                .await
            {
                Ok(pool) => return Ok(pool),
                Err(err) => {
                    attempts += 1;
                    if attempts >= 20 {
                        return Err(err).context("Postgres did not become ready");
                    }
                    sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }
}

pub struct RedisContainer {
    _container: ContainerAsync<GenericImage>,
    host_port: u16,
}

impl RedisContainer {
    /// # Errors
    /// Returns an error if the container fails to start or the port cannot be resolved.
    pub async fn start() -> Result<Self> {
        let container = GenericImage::new("redis", "7-alpine")
            .with_exposed_port(REDIS_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
            .start()
            .await
            .context("Failed to start Redis container")?;
        let host_port = container
            .get_host_port_ipv4(REDIS_PORT.tcp())
            .await
            .context("Failed to resolve Redis host port")?;

        Ok(Self {
            _container: container,
            host_port,
        })
    }

    /// `host:port` form, as accepted by `--redis-url`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.host_port)
    }
}
