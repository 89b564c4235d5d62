//! Request payloads and their field-level validation.
//!
//! Each field reports only its first failing rule, keyed by the JSON field
//! name. An empty map means the payload is valid.

use super::password::is_strong_password;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

pub const FULLNAME_MIN: usize = 3;
pub const FULLNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 8;

pub type FieldErrors = BTreeMap<String, String>;

/// Why a field was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldRule {
    Required,
    Email,
    Min(usize),
    Max(usize),
    StrongPassword,
    Matches,
}

impl FieldRule {
    #[must_use]
    pub fn message(self) -> String {
        match self {
            Self::Required => "This field is required".to_string(),
            Self::Email => "Invalid email format".to_string(),
            Self::Min(min) => format!("Too short (minimum {min} characters)"),
            Self::Max(max) => format!("Too long (maximum {max} characters)"),
            Self::StrongPassword => {
                "Password must contain upper, lower, numeric and symbol characters".to_string()
            }
            Self::Matches => "Passwords do not match".to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default)]
pub struct RegisterRequest {
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProfileRequest {
    #[serde(default)]
    pub fullname: String,
}

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Lightweight email sanity check.
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

fn check_length(value: &str, min: usize, max: Option<usize>) -> Option<FieldRule> {
    let len = value.chars().count();
    if len == 0 {
        return Some(FieldRule::Required);
    }
    if len < min {
        return Some(FieldRule::Min(min));
    }
    match max {
        Some(max) if len > max => Some(FieldRule::Max(max)),
        _ => None,
    }
}

fn check_full_name(value: &str) -> Option<FieldRule> {
    check_length(value.trim(), FULLNAME_MIN, Some(FULLNAME_MAX))
}

fn check_email(value: &str) -> Option<FieldRule> {
    if value.is_empty() {
        Some(FieldRule::Required)
    } else if valid_email(value) {
        None
    } else {
        Some(FieldRule::Email)
    }
}

fn check_password(value: &str) -> Option<FieldRule> {
    check_length(value, PASSWORD_MIN, None).or_else(|| {
        if is_strong_password(value) {
            None
        } else {
            Some(FieldRule::StrongPassword)
        }
    })
}

fn record(errors: &mut FieldErrors, field: &str, rule: Option<FieldRule>) {
    if let Some(rule) = rule {
        errors.insert(field.to_string(), rule.message());
    }
}

impl RegisterRequest {
    #[must_use]
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        record(&mut errors, "fullname", check_full_name(&self.fullname));
        record(&mut errors, "email", check_email(&self.email));
        record(&mut errors, "password", check_password(&self.password));

        let confirm = check_password(&self.password_confirm).or_else(|| {
            (self.password_confirm != self.password).then_some(FieldRule::Matches)
        });
        record(&mut errors, "password_confirm", confirm);

        errors
    }
}

impl LoginRequest {
    #[must_use]
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.email.is_empty() {
            record(&mut errors, "email", Some(FieldRule::Required));
        }
        if self.password.is_empty() {
            record(&mut errors, "password", Some(FieldRule::Required));
        }
        errors
    }
}

impl ProfileRequest {
    #[must_use]
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        record(&mut errors, "fullname", check_full_name(&self.fullname));
        errors
    }
}
