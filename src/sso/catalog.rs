//! Role and permission catalog.
//!
//! The catalog is data: the built-in default below or a JSON file with the
//! same shape. It is validated and seeded into the credential store once, at
//! startup, before the listener is bound.
//!
//! ```json
//! {
//!   "permissions": [{ "name": "Blog read", "slug": "blog:read" }],
//!   "roles": [
//!     { "name": "Reader", "slug": "reader", "self_register": true, "permissions": ["blog:read"] }
//!   ],
//!   "admin_role": "Reader"
//! }
//! ```

use super::{
    models::NewUser,
    password::{hash_password, PasswordError},
    store::{CredentialStore, StoreError},
    validation::valid_email,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid catalog: {0}")]
    Invalid(String),
    #[error("failed to seed catalog: {0}")]
    Store(#[from] StoreError),
    #[error("failed to hash administrator password: {0}")]
    Password(#[from] PasswordError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSpec {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    /// Path segment used by `POST /register/{role}`.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub self_register: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCatalog {
    pub permissions: Vec<PermissionSpec>,
    pub roles: Vec<RoleSpec>,
    pub admin_role: String,
}

/// Administrator account created on first start.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: SecretString,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions: usize,
    pub roles: usize,
    pub admin_created: bool,
}

fn permission(name: &str, slug: &str) -> PermissionSpec {
    PermissionSpec {
        name: name.to_string(),
        slug: slug.to_string(),
    }
}

fn role(name: &str, slug: Option<&str>, permissions: &[&str]) -> RoleSpec {
    RoleSpec {
        name: name.to_string(),
        slug: slug.map(str::to_string),
        self_register: slug.is_some(),
        permissions: permissions.iter().map(|p| (*p).to_string()).collect(),
    }
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self {
            permissions: vec![
                permission("Blog read", "blog:read"),
                permission("Blog write", "blog:write"),
                permission("Library read", "library:read"),
                permission("Library write", "library:write"),
            ],
            roles: vec![
                role("Reader", Some("reader"), &["blog:read"]),
                role("Editor", Some("editor"), &["blog:read", "blog:write"]),
                role("Administrator", None, &["blog:read", "blog:write"]),
            ],
            admin_role: "Administrator".to_string(),
        }
    }
}

impl RoleCatalog {
    /// # Errors
    /// Returns `CatalogError::Parse` for malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Check uniqueness of slugs and names and that every reference resolves.
    ///
    /// # Errors
    /// Returns `CatalogError::Invalid` naming the first problem found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut permission_slugs = HashSet::new();
        for permission in &self.permissions {
            if permission.slug.trim().is_empty() {
                return Err(CatalogError::Invalid("empty permission slug".to_string()));
            }
            if !permission_slugs.insert(permission.slug.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate permission slug: {}",
                    permission.slug
                )));
            }
        }

        let mut role_names = HashSet::new();
        let mut role_slugs = HashSet::new();
        for role in &self.roles {
            if role.name.trim().is_empty() {
                return Err(CatalogError::Invalid("empty role name".to_string()));
            }
            if !role_names.insert(role.name.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate role name: {}",
                    role.name
                )));
            }
            if let Some(slug) = &role.slug {
                if !role_slugs.insert(slug.as_str()) {
                    return Err(CatalogError::Invalid(format!("duplicate role slug: {slug}")));
                }
            }
            if role.self_register && role.slug.is_none() {
                return Err(CatalogError::Invalid(format!(
                    "self-register role {} has no slug",
                    role.name
                )));
            }
            if let Some(unknown) = role
                .permissions
                .iter()
                .find(|slug| !permission_slugs.contains(slug.as_str()))
            {
                return Err(CatalogError::Invalid(format!(
                    "role {} references unknown permission {unknown}",
                    role.name
                )));
            }
        }

        if !role_names.contains(self.admin_role.as_str()) {
            return Err(CatalogError::Invalid(format!(
                "admin role {} is not defined",
                self.admin_role
            )));
        }

        Ok(())
    }

    /// Role open to self registration under the given path segment.
    #[must_use]
    pub fn registrable_role(&self, slug: &str) -> Option<&RoleSpec> {
        self.roles
            .iter()
            .find(|role| role.self_register && role.slug.as_deref() == Some(slug))
    }

    #[must_use]
    pub fn role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|role| role.name == name)
    }
}

/// Create missing permissions, roles, role links and the administrator.
///
/// Safe to run on every start: nothing is updated or removed, and an existing
/// administrator keeps its password.
///
/// # Errors
/// Returns an error if the store fails or the admin seed is unusable.
pub async fn seed(
    store: &dyn CredentialStore,
    catalog: &RoleCatalog,
    admin: &AdminSeed,
) -> Result<SeedReport, CatalogError> {
    let mut report = SeedReport::default();

    for permission in &catalog.permissions {
        store
            .ensure_permission(&permission.name, &permission.slug)
            .await?;
        report.permissions += 1;
    }

    for role in &catalog.roles {
        let seeded = store.ensure_role(&role.name, &role.permissions).await?;
        debug!(role = %seeded.name, permissions = ?seeded.permission_slugs(), "role seeded");
        report.roles += 1;
    }

    report.admin_created = seed_admin(store, &catalog.admin_role, admin).await?;

    info!(
        permissions = report.permissions,
        roles = report.roles,
        admin_created = report.admin_created,
        "Catalog seeded"
    );

    Ok(report)
}

async fn seed_admin(
    store: &dyn CredentialStore,
    role_name: &str,
    admin: &AdminSeed,
) -> Result<bool, CatalogError> {
    if !valid_email(&admin.email) {
        return Err(CatalogError::Invalid(format!(
            "invalid administrator email: {}",
            admin.email
        )));
    }
    if admin.password.expose_secret().is_empty() {
        return Err(CatalogError::Invalid(
            "administrator password is empty".to_string(),
        ));
    }

    if store.find_user_by_email(&admin.email).await?.is_some() {
        debug!("Administrator {} already present", admin.email);
        return Ok(false);
    }

    let role = store
        .find_role_by_name(role_name)
        .await?
        .ok_or_else(|| CatalogError::Invalid(format!("admin role {role_name} not seeded")))?;

    let password_hash = hash_password(admin.password.expose_secret())?;

    match store
        .create_user(NewUser {
            id: Uuid::new_v4(),
            email: admin.email.clone(),
            password_hash,
            role_id: role.id,
        })
        .await
    {
        Ok(_) => Ok(true),
        Err(StoreError::Conflict(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Permission slugs granted to a role, empty if the role is unknown.
///
/// # Errors
/// Returns the store error if the lookup fails.
pub async fn permissions_for(
    store: &dyn CredentialStore,
    role_name: &str,
) -> Result<Vec<String>, StoreError> {
    Ok(store
        .find_role_by_name(role_name)
        .await?
        .map(|role| role.permission_slugs())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sso::{password::verify_password, store::MemoryCredentialStore};
    use anyhow::Result;

    fn admin(password: &str) -> AdminSeed {
        AdminSeed {
            email: "admin@example.com".to_string(),
            password: SecretString::from(password.to_string()),
        }
    }

    #[test]
    fn default_catalog_is_valid() -> Result<()> {
        let catalog = RoleCatalog::default();
        catalog.validate()?;
        assert_eq!(catalog.permissions.len(), 4);
        assert_eq!(catalog.roles.len(), 3);
        Ok(())
    }

    #[test]
    fn registrable_roles() {
        let catalog = RoleCatalog::default();
        assert_eq!(
            catalog.registrable_role("reader").map(|r| r.name.as_str()),
            Some("Reader")
        );
        assert_eq!(
            catalog.registrable_role("editor").map(|r| r.name.as_str()),
            Some("Editor")
        );
        assert!(catalog.registrable_role("administrator").is_none());
        assert!(catalog.registrable_role("Administrator").is_none());
        assert!(catalog.registrable_role("").is_none());
    }

    #[test]
    fn validate_rejects_duplicate_permission() {
        let mut catalog = RoleCatalog::default();
        catalog.permissions.push(permission("Again", "blog:read"));
        assert!(matches!(catalog.validate(), Err(CatalogError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_duplicate_role_slug() {
        let mut catalog = RoleCatalog::default();
        catalog.roles.push(role("Guest", Some("reader"), &[]));
        assert!(matches!(catalog.validate(), Err(CatalogError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_unknown_permission_reference() {
        let mut catalog = RoleCatalog::default();
        catalog.roles.push(role("Guest", None, &["videos:watch"]));
        let err = catalog.validate().err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("invalid catalog: role Guest references unknown permission videos:watch")
        );
    }

    #[test]
    fn validate_rejects_missing_admin_role() {
        let catalog = RoleCatalog {
            admin_role: "Root".to_string(),
            ..RoleCatalog::default()
        };
        assert!(matches!(catalog.validate(), Err(CatalogError::Invalid(_))));
    }

    #[test]
    fn catalog_from_json() -> Result<()> {
        let catalog = RoleCatalog::from_json_str(
            r#"{
                "permissions": [{"name": "Library read", "slug": "library:read"}],
                "roles": [
                    {"name": "Member", "slug": "member", "self_register": true, "permissions": ["library:read"]},
                    {"name": "Owner"}
                ],
                "admin_role": "Owner"
            }"#,
        )?;
        catalog.validate()?;
        assert_eq!(
            catalog.registrable_role("member").map(|r| r.name.as_str()),
            Some("Member")
        );
        assert_eq!(catalog.role("Owner").map(|r| r.self_register), Some(false));
        assert!(RoleCatalog::from_json_str("{").is_err());
        Ok(())
    }

    #[test]
    fn missing_catalog_file() {
        let result = RoleCatalog::from_json_file(Path::new("/nonexistent/catalog.json"));
        assert!(matches!(result, Err(CatalogError::Read { .. })));
    }

    #[tokio::test]
    async fn seed_is_idempotent() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let catalog = RoleCatalog::default();

        let first = seed(&store, &catalog, &admin("Admin123!")).await?;
        assert!(first.admin_created);

        let reader = store.find_role_by_name("Reader").await?;
        let editor = store.find_role_by_name("Editor").await?;

        let second = seed(&store, &catalog, &admin("Other456?")).await?;
        assert!(!second.admin_created);
        assert_eq!(store.find_role_by_name("Reader").await?, reader);
        assert_eq!(store.find_role_by_name("Editor").await?, editor);
        assert_eq!(store.user_count().await, 1);

        let stored = store
            .find_user_by_email("admin@example.com")
            .await?
            .ok_or_else(|| anyhow::anyhow!("admin missing"))?;
        assert_eq!(stored.role.name, "Administrator");
        assert!(verify_password(&stored.password_hash, "Admin123!"));
        assert!(!verify_password(&stored.password_hash, "Other456?"));
        Ok(())
    }

    #[tokio::test]
    async fn seed_report_counts() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let report = seed(&store, &RoleCatalog::default(), &admin("Admin123!")).await?;
        assert_eq!(
            report,
            SeedReport {
                permissions: 4,
                roles: 3,
                admin_created: true
            }
        );
        assert_eq!(store.user_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn seed_rejects_invalid_admin_email() {
        let store = MemoryCredentialStore::new();
        let bad = AdminSeed {
            email: "not-an-email".to_string(),
            password: SecretString::from("Admin123!".to_string()),
        };
        let result = seed(&store, &RoleCatalog::default(), &bad).await;
        assert!(matches!(result, Err(CatalogError::Invalid(_))));
    }

    #[tokio::test]
    async fn permissions_for_roles() -> Result<()> {
        let store = MemoryCredentialStore::new();
        seed(&store, &RoleCatalog::default(), &admin("Admin123!")).await?;

        assert_eq!(
            permissions_for(&store, "Editor").await?,
            vec!["blog:read", "blog:write"]
        );
        assert_eq!(permissions_for(&store, "Reader").await?, vec!["blog:read"]);
        assert!(permissions_for(&store, "Nobody").await?.is_empty());
        Ok(())
    }
}
