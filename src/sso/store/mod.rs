//! Persistence of users, roles, permissions and profiles.
//!
//! Lookups never return soft-deleted users. Email uniqueness is decided by
//! the store itself, so two concurrent inserts of the same email yield one
//! user and one [`StoreError::Conflict`].

mod memory;
mod postgres;

pub use self::memory::MemoryCredentialStore;
pub use self::postgres::{apply_schema, split_sql_statements, PgCredentialStore};

use super::models::{NewUser, Permission, Role, User, UserProfile};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("not found: {0}")]
    Missing(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Connectivity and pool statistics reported by `/health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    pub up: bool,
    pub open_connections: u32,
    pub in_use: u32,
    pub idle: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    /// Insert a user; a duplicate email is a `Conflict`.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Create the permission if its slug is unknown; never updates.
    async fn ensure_permission(&self, name: &str, slug: &str) -> Result<Permission, StoreError>;

    /// Create the role if absent and link it to the given permission slugs.
    /// Links are only added, never removed.
    async fn ensure_role(&self, name: &str, permission_slugs: &[String])
        -> Result<Role, StoreError>;

    /// Attach a profile to a live user; a second profile is a `Conflict`.
    async fn create_profile(&self, user_id: Uuid, full_name: &str)
        -> Result<UserProfile, StoreError>;

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError>;

    /// Mark a user deleted. Returns false if no live user had that id.
    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn health(&self) -> StoreHealth;
}

pub(crate) const EMAIL_CONFLICT: &str = "email already registered";
pub(crate) const PROFILE_CONFLICT: &str = "profile already exists";
