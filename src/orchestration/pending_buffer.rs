//! # Pending Message Buffer
//!
//! Holds completion messages whose task could not be resolved yet, keyed by external job
//! id, in arrival order. Entries expire after the configured TTL; every write restarts it.
//!
//! Buffer operations never fail the caller: cache errors are logged and read as "no
//! pending messages". Writes for one job id are serialized so FIFO order survives
//! concurrent deliveries.

use super::keyed_lock::KeyedLocks;
use crate::cache::MessageCache;
use crate::constants::pending_key;
use crate::messaging::PendingMessage;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub struct PendingMessageBuffer {
    cache: Arc<dyn MessageCache>,
    ttl: Duration,
    key_locks: KeyedLocks<String>,
}

impl std::fmt::Debug for PendingMessageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMessageBuffer")
            .field("provider", &self.cache.provider_name())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl PendingMessageBuffer {
    pub fn new(cache: Arc<dyn MessageCache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            key_locks: KeyedLocks::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Append `message` to the end of `job_id`'s list and refresh the TTL.
    ///
    /// Returns `false` when the message could not be stored.
    pub async fn append(&self, job_id: &str, message: PendingMessage) -> bool {
        let key = pending_key(job_id);
        let _guard = self.key_locks.lock(key.clone()).await;

        let mut messages = match self.cache.get(&key).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(job_id = %job_id, error = %e, payload = %message.payload, "Failed to read pending messages before append");
                return false;
            }
        };
        let payload = message.payload.clone();
        messages.push(message);
        let depth = messages.len();

        match self.cache.set(&key, messages, self.ttl).await {
            Ok(()) => {
                debug!(job_id = %job_id, depth = depth, "Completion message buffered");
                true
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, payload = %payload, "Failed to buffer completion message");
                false
            }
        }
    }

    /// All pending messages for `job_id`, oldest first. Does not remove them.
    pub async fn drain(&self, job_id: &str) -> Vec<PendingMessage> {
        let key = pending_key(job_id);
        let _guard = self.key_locks.lock(key.clone()).await;

        match self.cache.get(&key).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to read pending messages, treating as none");
                Vec::new()
            }
        }
    }

    /// Remove every pending message for `job_id`
    pub async fn clear(&self, job_id: &str) {
        let key = pending_key(job_id);
        let _guard = self.key_locks.lock(key.clone()).await;

        if let Err(e) = self.cache.delete(&key).await {
            error!(job_id = %job_id, error = %e, "Failed to clear pending messages");
        }
    }

    /// Remove exactly the `replayed` messages, keeping anything appended after the drain
    pub async fn acknowledge(&self, job_id: &str, replayed: &[PendingMessage]) {
        if replayed.is_empty() {
            return;
        }
        let key = pending_key(job_id);
        let _guard = self.key_locks.lock(key.clone()).await;

        let current = match self.cache.get(&key).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to read pending messages for acknowledgement");
                return;
            }
        };

        let replayed_ids: HashSet<_> = replayed.iter().map(|m| m.message_id).collect();
        let remaining: Vec<_> = current
            .into_iter()
            .filter(|m| !replayed_ids.contains(&m.message_id))
            .collect();

        let result = if remaining.is_empty() {
            self.cache.delete(&key).await
        } else {
            self.cache.set(&key, remaining, self.ttl).await
        };
        if let Err(e) = result {
            error!(job_id = %job_id, error = %e, "Failed to acknowledge replayed messages");
        }
    }

    /// Eagerly drop expired entries and idle key locks
    pub async fn purge_expired(&self) -> u64 {
        let pruned_locks = self.key_locks.prune_idle();
        match self.cache.purge_expired().await {
            Ok(purged) => {
                if purged > 0 || pruned_locks > 0 {
                    debug!(purged = purged, pruned_locks = pruned_locks, "Pending buffer swept");
                }
                purged
            }
            Err(e) => {
                error!(error = %e, "Failed to purge expired pending messages");
                0
            }
        }
    }
}
