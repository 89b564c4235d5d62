//! Short-lived authorization codes.
//!
//! A code maps to the id of the user who just logged in. It lives for
//! [`CODE_TTL`] and is removed by the first successful [`CodeStore::take`].

mod memory;
mod redis_store;

pub use self::memory::MemoryCodeStore;
pub use self::redis_store::RedisCodeStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub const CODE_TTL: Duration = Duration::from_secs(300);
pub const CODE_KEY_PREFIX: &str = "auth_code:";

#[derive(Debug, Error)]
pub enum CodeStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Key under which a code is stored.
#[must_use]
pub fn code_key(code: &str) -> String {
    format!("{CODE_KEY_PREFIX}{code}")
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Store `code -> user_id`, replacing any previous value, expiring after `ttl`.
    async fn put(&self, code: &str, user_id: &str, ttl: Duration) -> Result<(), CodeStoreError>;

    /// Atomically read and delete a code. `None` if absent or expired.
    async fn take(&self, code: &str) -> Result<Option<String>, CodeStoreError>;

    async fn ping(&self) -> Result<(), CodeStoreError>;
}
