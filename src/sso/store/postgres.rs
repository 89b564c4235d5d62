use super::{CredentialStore, StoreError, StoreHealth, EMAIL_CONFLICT, PROFILE_CONFLICT};
use crate::sso::models::{NewUser, Permission, Role, User, UserProfile};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));
const HEALTH_DB_TIMEOUT: Duration = Duration::from_secs(1);

/// Postgres credential store on a shared sqlx pool.
#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

/// Splits a schema file into individual statements. Assumes statements end
/// with `;` at the end of a line and do not nest semicolons.
#[must_use]
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

/// Apply the bundled schema. Every statement is `IF NOT EXISTS`.
///
/// # Errors
/// Returns the first failing statement's error.
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in split_sql_statements(SCHEMA_SQL) {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = statement.as_str()
        );
        sqlx::query(&statement)
            .execute(pool)
            .instrument(span)
            .await?;
    }
    debug!("Schema applied");
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23503"),
        _ => false,
    }
}

fn permission_from_row(row: &PgRow) -> Permission {
    Permission {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn profile_from_row(row: &PgRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        full_name: row.get("full_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_role(&self, role_id: Uuid) -> Result<Option<Role>, StoreError> {
        let query = "SELECT id, name, created_at, updated_at FROM roles WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let Some(row) = sqlx::query(query)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
        else {
            return Ok(None);
        };

        let query = r"
            SELECT p.id, p.name, p.slug, p.created_at, p.updated_at
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.slug
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let permissions = sqlx::query(query)
            .bind(role_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?
            .iter()
            .map(permission_from_row)
            .collect();

        Ok(Some(Role {
            id: row.get("id"),
            name: row.get("name"),
            permissions,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn user_from_row(&self, row: &PgRow) -> Result<User, StoreError> {
        let role_id: Uuid = row.get("role_id");
        let role = self
            .load_role(role_id)
            .await?
            .ok_or_else(|| StoreError::Missing(format!("role {role_id}")))?;

        Ok(User {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            role,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let query = "SELECT id FROM roles WHERE name = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(name)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        match row {
            Some(row) => self.load_role(row.get("id")).await,
            None => Ok(None),
        }
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let query = r"
            INSERT INTO users (id, email, password_hash, role_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, role_id, created_at, updated_at, deleted_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => self.user_from_row(&row).await,
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict(EMAIL_CONFLICT.to_string()))
            }
            Err(err) if is_foreign_key_violation(&err) => {
                Err(StoreError::Missing(format!("role {}", user.role_id)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT id, email, password_hash, role_id, created_at, updated_at, deleted_at
            FROM users
            WHERE email = $1 AND deleted_at IS NULL
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        match row {
            Some(row) => self.user_from_row(&row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT id, email, password_hash, role_id, created_at, updated_at, deleted_at
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        match row {
            Some(row) => self.user_from_row(&row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn ensure_permission(&self, name: &str, slug: &str) -> Result<Permission, StoreError> {
        let query = r"
            INSERT INTO permissions (id, name, slug)
            VALUES ($1, $2, $3)
            ON CONFLICT (slug) DO NOTHING
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(slug)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        let query = "SELECT id, name, slug, created_at, updated_at FROM permissions WHERE slug = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(slug)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        Ok(permission_from_row(&row))
    }

    async fn ensure_role(
        &self,
        name: &str,
        permission_slugs: &[String],
    ) -> Result<Role, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = r"
            INSERT INTO roles (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(name)
            .execute(&mut *tx)
            .instrument(span)
            .await?;

        let query = "SELECT id FROM roles WHERE name = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let role_id: Uuid = sqlx::query(query)
            .bind(name)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await?
            .get("id");

        let query = r"
            INSERT INTO role_permissions (role_id, permission_id)
            SELECT $1, id FROM permissions WHERE slug = $2
            ON CONFLICT DO NOTHING
        ";
        for slug in permission_slugs {
            let exists_query = "SELECT EXISTS(SELECT 1 FROM permissions WHERE slug = $1) AS exists";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = exists_query
            );
            let exists: bool = sqlx::query(exists_query)
                .bind(slug)
                .fetch_one(&mut *tx)
                .instrument(span)
                .await?
                .get("exists");

            // dropping `tx` rolls back
            if !exists {
                return Err(StoreError::Missing(format!("permission {slug}")));
            }

            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(role_id)
                .bind(slug)
                .execute(&mut *tx)
                .instrument(span)
                .await?;
        }

        tx.commit().await?;

        self.load_role(role_id)
            .await?
            .ok_or_else(|| StoreError::Missing(format!("role {name}")))
    }

    async fn create_profile(
        &self,
        user_id: Uuid,
        full_name: &str,
    ) -> Result<UserProfile, StoreError> {
        let query = r"
            INSERT INTO user_profiles (id, user_id, full_name)
            SELECT $1, id, $3 FROM users WHERE id = $2 AND deleted_at IS NULL
            RETURNING id, user_id, full_name, created_at, updated_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(full_name)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(Some(row)) => Ok(profile_from_row(&row)),
            Ok(None) => Err(StoreError::Missing(format!("user {user_id}"))),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict(PROFILE_CONFLICT.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        let query = r"
            SELECT id, user_id, full_name, created_at, updated_at
            FROM user_profiles
            WHERE user_id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.as_ref().map(profile_from_row))
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = r"
            UPDATE users
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn health(&self) -> StoreHealth {
        let open_connections = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        let mut health = StoreHealth {
            up: false,
            open_connections,
            in_use: open_connections.saturating_sub(idle),
            idle,
            error: None,
        };

        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let probe = timeout(HEALTH_DB_TIMEOUT, async {
            let mut conn = self.pool.acquire().instrument(acquire_span).await?;
            let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
            conn.ping().instrument(ping_span).await
        })
        .await;

        match probe {
            Ok(Ok(())) => health.up = true,
            Ok(Err(err)) => {
                error!("Failed to ping database: {}", err);
                health.error = Some(err.to_string());
            }
            Err(_) => {
                warn!("Database health check timed out");
                health.error = Some("timeout".to_string());
            }
        }

        health
    }
}
