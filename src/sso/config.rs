//! Server configuration assembled by the CLI.

use super::catalog::AdminSeed;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_SCHEMA: &str = "public";

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    host: String,
    port: u16,
    user: String,
    password: SecretString,
    name: String,
    schema: String,
}

impl DatabaseConfig {
    #[must_use]
    pub fn new(host: String, user: String, password: SecretString, name: String) -> Self {
        Self {
            host,
            port: DEFAULT_DB_PORT,
            user,
            password,
            name,
            schema: DEFAULT_DB_SCHEMA.to_string(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: String) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Connection options with `search_path` pinned to the configured schema.
    #[must_use]
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.name)
            .options([("search_path", self.schema.as_str())])
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    port: u16,
    database: DatabaseConfig,
    redis_url: String,
    redis_password: Option<SecretString>,
    private_key_path: PathBuf,
    public_key_path: PathBuf,
    admin: AdminSeed,
    catalog_path: Option<PathBuf>,
    allowed_redirects: Vec<String>,
}

impl ServerConfig {
    #[must_use]
    pub fn new(
        database: DatabaseConfig,
        redis_url: String,
        private_key_path: PathBuf,
        public_key_path: PathBuf,
        admin: AdminSeed,
    ) -> Self {
        Self {
            port: DEFAULT_PORT,
            database,
            redis_url,
            redis_password: None,
            private_key_path,
            public_key_path,
            admin,
            catalog_path: None,
            allowed_redirects: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_redis_password(mut self, password: Option<SecretString>) -> Self {
        self.redis_password = password;
        self
    }

    #[must_use]
    pub fn with_catalog_path(mut self, path: Option<PathBuf>) -> Self {
        self.catalog_path = path;
        self
    }

    #[must_use]
    pub fn with_allowed_redirects(mut self, origins: Vec<String>) -> Self {
        self.allowed_redirects = origins;
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    #[must_use]
    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    #[must_use]
    pub fn redis_password(&self) -> Option<&SecretString> {
        self.redis_password.as_ref()
    }

    #[must_use]
    pub fn private_key_path(&self) -> &PathBuf {
        &self.private_key_path
    }

    #[must_use]
    pub fn public_key_path(&self) -> &PathBuf {
        &self.public_key_path
    }

    #[must_use]
    pub fn admin(&self) -> &AdminSeed {
        &self.admin
    }

    #[must_use]
    pub fn catalog_path(&self) -> Option<&PathBuf> {
        self.catalog_path.as_ref()
    }

    #[must_use]
    pub fn allowed_redirects(&self) -> &[String] {
        &self.allowed_redirects
    }
}
