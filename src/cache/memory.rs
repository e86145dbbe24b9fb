//! In-process message cache with lazy expiry

use super::errors::CacheResult;
use super::traits::MessageCache;
use crate::messaging::PendingMessage;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    messages: Vec<PendingMessage>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// `DashMap`-backed [`MessageCache`] for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct InMemoryMessageCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, expired ones included until purged or read
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MessageCache for InMemoryMessageCache {
    async fn get(&self, key: &str) -> CacheResult<Vec<PendingMessage>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(entry.messages.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            debug!(key = %key, "Expired pending entry dropped on read");
        }
        Ok(Vec::new())
    }

    async fn set(
        &self,
        key: &str,
        messages: Vec<PendingMessage>,
        ttl: Duration,
    ) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                messages,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
