//! Auth flow controller.
//!
//! Flow Overview:
//! 1) `register` creates a user in a self-registrable role.
//! 2) `login` checks credentials, stores a one-time code and returns the
//!    caller's redirect URL with `?code=` appended.
//! 3) `exchange_code` redeems the code (once) for a signed token.
//! 4) `authenticate` turns a bearer token back into an [`Identity`].

use super::{
    catalog::{permissions_for, RoleCatalog},
    code_store::{CodeStore, CODE_TTL},
    error::AuthError,
    models::{Identity, NewUser, PublicUser, UserProfile},
    password::{hash_password, verify_password},
    store::{CredentialStore, StoreError},
    token::TokenService,
    validation::{FieldErrors, FieldRule, LoginRequest, ProfileRequest, RegisterRequest},
};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use url::{Origin, Url};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExchangeUser {
    pub email: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResponse {
    pub token: String,
    pub user: ExchangeUser,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum RedirectConfigError {
    #[error("invalid redirect origin {origin}: {source}")]
    Parse {
        origin: String,
        source: url::ParseError,
    },
    #[error("redirect origin {0} must be an http(s) URL with a host")]
    NotHttp(String),
}

/// Which redirect targets `login` may send the browser to.
///
/// An empty allow-list accepts any absolute http(s) URL.
#[derive(Debug, Clone, Default)]
pub struct RedirectPolicy {
    allowed: Vec<Origin>,
}

impl RedirectPolicy {
    #[must_use]
    pub fn allow_any() -> Self {
        Self::default()
    }

    /// Build an allow-list from origins such as `https://app.example.com`.
    ///
    /// # Errors
    /// Returns the first entry that is not an http(s) URL with a host.
    pub fn from_origins<I, S>(origins: I) -> Result<Self, RedirectConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = origins
            .into_iter()
            .map(|origin| parse_origin(origin.as_ref().trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { allowed })
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Parse and check a redirect target.
    ///
    /// # Errors
    /// `InvalidRedirect` for anything but an absolute http(s) URL with a host,
    /// `RedirectNotAllowed` when the origin is not on the allow-list.
    pub fn resolve(&self, raw: &str) -> Result<Url, AuthError> {
        let url = Url::parse(raw.trim()).map_err(|_| AuthError::InvalidRedirect)?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(AuthError::InvalidRedirect);
        }

        if !self.allowed.is_empty() && !self.allowed.contains(&url.origin()) {
            return Err(AuthError::RedirectNotAllowed);
        }

        Ok(url)
    }
}

// `localhost:3000` parses with scheme `localhost` and an opaque origin.
fn parse_origin(raw: &str) -> Result<Origin, RedirectConfigError> {
    let url = Url::parse(raw).map_err(|source| RedirectConfigError::Parse {
        origin: raw.to_string(),
        source,
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(RedirectConfigError::NotHttp(raw.to_string()));
    }

    Ok(url.origin())
}

fn store_error(err: StoreError) -> AuthError {
    match err {
        StoreError::Conflict(message) => AuthError::Conflict(message),
        other => AuthError::Dependency(other.to_string()),
    }
}

async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Dependency(format!("password hashing task failed: {e}")))?
        .map_err(|e| AuthError::Dependency(e.to_string()))
}

async fn verify_blocking(hash: String, password: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&hash, &password))
        .await
        .map_err(|e| AuthError::Dependency(format!("password verification task failed: {e}")))
}

// Verified against on unknown emails so both login failures cost one Argon2 run.
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("unknown-account-placeholder").ok());

async fn verify_dummy_blocking(password: String) -> Result<(), AuthError> {
    tokio::task::spawn_blocking(move || {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = verify_password(hash, &password);
        }
    })
    .await
    .map_err(|e| AuthError::Dependency(format!("password verification task failed: {e}")))
}

pub struct AuthFlow {
    store: Arc<dyn CredentialStore>,
    codes: Arc<dyn CodeStore>,
    tokens: Arc<TokenService>,
    catalog: Arc<RoleCatalog>,
    redirects: RedirectPolicy,
}

impl std::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFlow")
            .field("tokens", &self.tokens)
            .field("redirects", &self.redirects)
            .finish_non_exhaustive()
    }
}

impl AuthFlow {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codes: Arc<dyn CodeStore>,
        tokens: Arc<TokenService>,
        catalog: Arc<RoleCatalog>,
        redirects: RedirectPolicy,
    ) -> Self {
        Lazy::force(&DUMMY_HASH);
        Self {
            store,
            codes,
            tokens,
            catalog,
            redirects,
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn codes(&self) -> &dyn CodeStore {
        self.codes.as_ref()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create a user in the role registered under `role_slug`.
    ///
    /// # Errors
    /// `Validation`, `UnknownRole`, `Conflict` for a taken email,
    /// `Configuration` when the catalog role was never seeded.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(
        &self,
        role_slug: &str,
        request: RegisterRequest,
    ) -> Result<PublicUser, AuthError> {
        let errors = request.validate();
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let role_spec = self
            .catalog
            .registrable_role(role_slug)
            .ok_or_else(|| AuthError::UnknownRole(role_slug.to_string()))?;

        let role = self
            .store
            .find_role_by_name(&role_spec.name)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                AuthError::Configuration(format!("role {} is not seeded", role_spec.name))
            })?;

        let password_hash = hash_blocking(request.password).await?;

        let user = self
            .store
            .create_user(NewUser {
                id: Uuid::new_v4(),
                email: request.email,
                password_hash,
                role_id: role.id,
            })
            .await
            .map_err(store_error)?;

        info!(user_id = %user.id, role = %user.role.name, "User registered");

        Ok(PublicUser::from(&user))
    }

    /// Check credentials and mint a one-time code for the redirect.
    ///
    /// Unknown email and wrong password share one error; only logs tell them
    /// apart.
    ///
    /// # Errors
    /// `Validation`, `InvalidRedirect`, `RedirectNotAllowed`,
    /// `InvalidCredentials`, `Dependency` when the code store fails.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(
        &self,
        request: LoginRequest,
        redirect_url: Option<&str>,
    ) -> Result<Url, AuthError> {
        let mut errors: FieldErrors = request.validate();
        let redirect_url = redirect_url.map(str::trim).unwrap_or_default();
        if redirect_url.is_empty() {
            errors.insert("redirect_url".to_string(), FieldRule::Required.message());
        }
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let mut target = self.redirects.resolve(redirect_url)?;

        let Some(user) = self
            .store
            .find_user_by_email(&request.email)
            .await
            .map_err(store_error)?
        else {
            verify_dummy_blocking(request.password).await?;
            warn!("Login failed: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_blocking(user.password_hash.clone(), request.password).await? {
            warn!(user_id = %user.id, "Login failed: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let code = Uuid::new_v4().to_string();
        self.codes
            .put(&code, &user.id.to_string(), CODE_TTL)
            .await
            .map_err(|e| AuthError::Dependency(e.to_string()))?;

        target.query_pairs_mut().append_pair("code", &code);

        info!(user_id = %user.id, "Authorization code issued");

        Ok(target)
    }

    /// Redeem a code for a signed token. The code is consumed even when a
    /// later step fails.
    ///
    /// # Errors
    /// `CodeInvalidOrExpired`, `UserNotFound`, `TokenIssuanceFailed`,
    /// `Dependency` when a store fails.
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<ExchangeResponse, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::CodeInvalidOrExpired);
        }

        let user_id = self
            .codes
            .take(code)
            .await
            .map_err(|e| AuthError::Dependency(e.to_string()))?
            .ok_or(AuthError::CodeInvalidOrExpired)?;

        let user_id = Uuid::parse_str(&user_id).map_err(|_| {
            error!("Code store held a non-UUID user id");
            AuthError::UserNotFound
        })?;

        let user = self
            .store
            .find_user_by_id(user_id)
            .await
            .map_err(store_error)?
            .ok_or(AuthError::UserNotFound)?;

        let token = self
            .tokens
            .issue(&user)
            .map_err(AuthError::TokenIssuanceFailed)?;

        info!(user_id = %user.id, "Token issued");

        Ok(ExchangeResponse {
            token,
            user: ExchangeUser {
                email: user.email,
                role: user.role.name,
            },
        })
    }

    /// Resolve the identity carried by an `Authorization: Bearer` header.
    ///
    /// # Errors
    /// `Unauthorized` for a missing header, another scheme, or any token failure.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::Unauthorized)?;

        let (scheme, token) = header
            .trim()
            .split_once(' ')
            .ok_or(AuthError::Unauthorized)?;
        let token = token.trim();

        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        let claims = self.tokens.verify(token).map_err(|err| {
            debug!("Bearer token rejected: {err}");
            AuthError::Unauthorized
        })?;

        claims.identity().map_err(|_| AuthError::Unauthorized)
    }

    /// Attach the basic profile to the authenticated user.
    ///
    /// # Errors
    /// `Validation`, `Unauthorized` when the user no longer exists,
    /// `Conflict` when a profile already exists.
    #[instrument(skip(self, request), fields(user_id = %identity.id))]
    pub async fn create_profile(
        &self,
        identity: &Identity,
        request: ProfileRequest,
    ) -> Result<UserProfile, AuthError> {
        let errors = request.validate();
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        match self
            .store
            .create_profile(identity.id, request.fullname.trim())
            .await
        {
            Ok(profile) => Ok(profile),
            Err(StoreError::Missing(_)) => {
                warn!("Profile requested for a missing user");
                Err(AuthError::Unauthorized)
            }
            Err(err) => Err(store_error(err)),
        }
    }

    /// Identity, permissions and profile name of the authenticated user.
    ///
    /// # Errors
    /// `Dependency` when the store fails.
    pub async fn me(&self, identity: &Identity) -> Result<MeResponse, AuthError> {
        let permissions = permissions_for(self.store.as_ref(), &identity.role)
            .await
            .map_err(store_error)?;
        let profile = self
            .store
            .find_profile(identity.id)
            .await
            .map_err(store_error)?;

        Ok(MeResponse {
            id: identity.id,
            email: identity.email.clone(),
            role: identity.role.clone(),
            permissions,
            full_name: profile.map(|p| p.full_name),
        })
    }
}
