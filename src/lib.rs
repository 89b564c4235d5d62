//! # SSO (Single Sign-On Identity Provider)
//!
//! `sso` registers users into role-based accounts, authenticates their
//! credentials and issues RS256-signed bearer tokens that downstream
//! applications verify offline with the published public key.
//!
//! ## Authorization Code Flow
//!
//! 1. `POST /login` checks the credentials, stores a one-time code in the code
//!    store (`auth_code:<code>`, 5 minute TTL) and redirects the browser to the
//!    caller's `redirect_url` with `?code=<code>` appended.
//! 2. The application backend calls `POST /exchange` with the code. The code is
//!    taken atomically (get-and-delete) so it can be redeemed only once, and a
//!    signed token valid for 24 hours is returned.
//!
//! ## Roles & Permissions
//!
//! Roles and permissions come from a catalog (built-in or a JSON file) that is
//! seeded idempotently on every startup, together with the configured
//! administrator account. Self registration is limited to catalog roles that
//! opt in (`reader` and `editor` by default).

pub mod cli;
pub mod sso;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
