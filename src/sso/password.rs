//! Argon2id password hashing and the strong-password rule.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed")]
    HashingFailed,
}

/// Hash a password into a PHC string with a random salt.
///
/// # Errors
/// Returns `PasswordError::HashingFailed` if Argon2 rejects the input.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::HashingFailed)
}

/// Check a plaintext password against a stored PHC hash.
///
/// A malformed hash never matches.
#[must_use]
pub fn verify_password(hash: &str, password: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// True if the password has at least one uppercase, lowercase, numeric and
/// punctuation/symbol character. Length is checked separately.
#[must_use]
pub fn is_strong_password(password: &str) -> bool {
    let mut upper = false;
    let mut lower = false;
    let mut number = false;
    let mut symbol = false;

    for c in password.chars() {
        if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_numeric() {
            number = true;
        } else if !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control() {
            symbol = true;
        }
    }

    upper && lower && number && symbol
}
