use super::{CredentialStore, StoreError, StoreHealth, EMAIL_CONFLICT, PROFILE_CONFLICT};
use crate::sso::models::{NewUser, Permission, Role, User, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct RoleRecord {
    id: Uuid,
    name: String,
    permission_slugs: BTreeSet<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct UserRecord {
    id: Uuid,
    email: String,
    password_hash: String,
    role_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    permissions: HashMap<String, Permission>,
    roles: HashMap<Uuid, RoleRecord>,
    users: HashMap<Uuid, UserRecord>,
    emails: HashMap<String, Uuid>,
    profiles: HashMap<Uuid, UserProfile>,
}

impl State {
    fn role(&self, id: Uuid) -> Option<Role> {
        let record = self.roles.get(&id)?;
        let permissions = record
            .permission_slugs
            .iter()
            .filter_map(|slug| self.permissions.get(slug).cloned())
            .collect();
        Some(Role {
            id: record.id,
            name: record.name.clone(),
            permissions,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    fn role_id_by_name(&self, name: &str) -> Option<Uuid> {
        self.roles
            .values()
            .find(|record| record.name == name)
            .map(|record| record.id)
    }

    fn live_user(&self, id: Uuid) -> Option<User> {
        let record = self.users.get(&id).filter(|r| r.deleted_at.is_none())?;
        let role = self.role(record.role_id)?;
        Some(User {
            id: record.id,
            email: record.email.clone(),
            password_hash: record.password_hash.clone(),
            role,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        })
    }
}

/// Credential store kept in process memory; all state sits behind one lock.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<State>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users, soft-deleted ones included.
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.role_id_by_name(name).and_then(|id| state.role(id)))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;

        if state.emails.contains_key(&user.email) {
            return Err(StoreError::Conflict(EMAIL_CONFLICT.to_string()));
        }
        if !state.roles.contains_key(&user.role_id) {
            return Err(StoreError::Missing(format!("role {}", user.role_id)));
        }

        let now = Utc::now();
        state.emails.insert(user.email.clone(), user.id);
        state.users.insert(
            user.id,
            UserRecord {
                id: user.id,
                email: user.email,
                password_hash: user.password_hash,
                role_id: user.role_id,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        );

        state
            .live_user(user.id)
            .ok_or_else(|| StoreError::Missing(format!("user {}", user.id)))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .emails
            .get(email)
            .and_then(|id| state.live_user(*id)))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.live_user(id))
    }

    async fn ensure_permission(&self, name: &str, slug: &str) -> Result<Permission, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let permission = state
            .permissions
            .entry(slug.to_string())
            .or_insert_with(|| Permission {
                id: Uuid::new_v4(),
                name: name.to_string(),
                slug: slug.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(permission.clone())
    }

    async fn ensure_role(
        &self,
        name: &str,
        permission_slugs: &[String],
    ) -> Result<Role, StoreError> {
        let mut state = self.state.lock().await;

        if let Some(missing) = permission_slugs
            .iter()
            .find(|slug| !state.permissions.contains_key(*slug))
        {
            return Err(StoreError::Missing(format!("permission {missing}")));
        }

        let id = if let Some(id) = state.role_id_by_name(name) {
            id
        } else {
            let now = Utc::now();
            let id = Uuid::new_v4();
            state.roles.insert(
                id,
                RoleRecord {
                    id,
                    name: name.to_string(),
                    permission_slugs: BTreeSet::new(),
                    created_at: now,
                    updated_at: now,
                },
            );
            id
        };

        if let Some(record) = state.roles.get_mut(&id) {
            record
                .permission_slugs
                .extend(permission_slugs.iter().cloned());
        }

        state
            .role(id)
            .ok_or_else(|| StoreError::Missing(format!("role {name}")))
    }

    async fn create_profile(
        &self,
        user_id: Uuid,
        full_name: &str,
    ) -> Result<UserProfile, StoreError> {
        let mut state = self.state.lock().await;

        if state.live_user(user_id).is_none() {
            return Err(StoreError::Missing(format!("user {user_id}")));
        }
        if state.profiles.contains_key(&user_id) {
            return Err(StoreError::Conflict(PROFILE_CONFLICT.to_string()));
        }

        let now = Utc::now();
        let profile = UserProfile {
            id: Uuid::new_v4(),
            user_id,
            full_name: full_name.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.state.lock().await.profiles.get(&user_id).cloned())
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&id) {
            Some(record) if record.deleted_at.is_none() => {
                let now = Utc::now();
                record.deleted_at = Some(now);
                record.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health(&self) -> StoreHealth {
        StoreHealth {
            up: true,
            ..StoreHealth::default()
        }
    }
}
