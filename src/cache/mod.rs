//! # Message Cache Module
//!
//! Keyed, TTL-bounded storage for completion messages that arrived before their task.
//!
//! The store is injected into the reconciler rather than held as process-wide state, so
//! deployments pick a backend and tests substitute their own.
//!
//! - **Lazy expiry**: expired keys read as empty; `purge_expired` is an optional sweep
//! - **Best-effort**: callers log cache errors and carry on without pending messages

pub mod errors;
pub mod memory;
pub mod traits;

pub use errors::{CacheError, CacheResult};
pub use memory::InMemoryMessageCache;
pub use traits::MessageCache;
