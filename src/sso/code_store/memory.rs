use super::{CodeStore, CodeStoreError};
use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};

/// In-process code store for tests and local runs.
///
/// Expiry uses `tokio::time::Instant`, so a paused test clock drives it.
#[derive(Debug, Default)]
pub struct MemoryCodeStore {
    codes: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) codes.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.codes
            .lock()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn put(&self, code: &str, user_id: &str, ttl: Duration) -> Result<(), CodeStoreError> {
        let mut codes = self.codes.lock().await;
        let now = Instant::now();
        codes.retain(|_, (_, expires_at)| *expires_at > now);
        codes.insert(code.to_string(), (user_id.to_string(), now + ttl));
        Ok(())
    }

    async fn take(&self, code: &str) -> Result<Option<String>, CodeStoreError> {
        let mut codes = self.codes.lock().await;
        Ok(codes
            .remove(code)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(user_id, _)| user_id))
    }

    async fn ping(&self) -> Result<(), CodeStoreError> {
        Ok(())
    }
}
