//! Keyed message cache trait

use super::errors::CacheResult;
use crate::messaging::PendingMessage;
use async_trait::async_trait;
use std::time::Duration;

/// Keyed store of message lists with per-key TTL.
///
/// Backs the pending message buffer. Implementations treat expired entries as absent.
#[async_trait]
pub trait MessageCache: Send + Sync {
    /// Messages stored under `key` in insertion order; empty on miss or expiry
    async fn get(&self, key: &str) -> CacheResult<Vec<PendingMessage>>;

    /// Replace the list under `key` and restart its TTL
    async fn set(&self, key: &str, messages: Vec<PendingMessage>, ttl: Duration)
        -> CacheResult<()>;

    /// Remove `key`; missing keys are not an error
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Drop expired entries eagerly, returning how many were removed.
    ///
    /// Backends with native expiry keep the default.
    async fn purge_expired(&self) -> CacheResult<u64> {
        Ok(0)
    }

    /// Get the name of the cache provider
    fn provider_name(&self) -> &'static str;
}
