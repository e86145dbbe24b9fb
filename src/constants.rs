//! # System Constants
//!
//! Event names, cache key layout and the defaults that bound the reconciliation engine.

use std::time::Duration;

/// Lifecycle events published by the reconciliation engine
pub mod events {
    pub const TASK_PROGRESS_UPDATED: &str = "task.progress_updated";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";

    pub const COMPLETION_BUFFERED: &str = "completion.buffered";
    pub const COMPLETION_REPLAYED: &str = "completion.replayed";
    pub const COMPLETION_DROPPED: &str = "completion.dropped";
}

/// Key prefix for pending completion messages in the keyed cache
pub const PENDING_KEY_PREFIX: &str = "pending_completion";

/// How long unclaimed completion messages are retained
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(3600);

/// Error text recorded when a job fails without reporting a reason
pub const DEFAULT_FAILURE_MESSAGE: &str = "External job reported a failure without details";

pub const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 16;

/// Reconcile passes per message before a version conflict is returned to the caller
pub const DEFAULT_MAX_SAVE_ATTEMPTS: u32 = 5;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Upper bound of any progress percentage
pub const MAX_PERCENT: u8 = 100;

/// Build the cache key holding pending messages for a job id
pub fn pending_key(job_id: &str) -> String {
    format!("{PENDING_KEY_PREFIX}:{job_id}")
}
