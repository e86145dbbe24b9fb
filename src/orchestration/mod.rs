//! # Orchestration Engine
//!
//! Reconciles out-of-order, duplicated and early completion messages into persisted task
//! state.
//!
//! ## Core Components
//!
//! - **CompletionReconciler**: ingress entry point; resolve, replay, aggregate, persist
//! - **TaskResolver**: finds the task owning an external job id (exact, then membership)
//! - **PendingMessageBuffer**: TTL-bounded FIFO of messages that arrived before their task
//! - **EngineStateAggregator**: merges one job's report into the per-engine state map
//! - **TaskLifecycleUpdater**: enforces the task state machine, persists, audits, publishes
//! - **KeyedLocks**: per-task and per-buffer-key mutual exclusion
//! - **MaintenanceSweeper**: periodic purge of expired buffers and idle locks
//!
//! ## Concurrency
//!
//! Messages for different tasks are processed in parallel. The read-merge-write sequence
//! for one task runs under that task's lock with the task re-read inside it, so two
//! engines reporting at once cannot overwrite each other's engine state.
//! Across processes, saves are compare-and-swap on the task's `lock_version`; a stale
//! save reruns the pass from a fresh read.

pub mod completion_reconciler;
pub mod engine_state_aggregator;
pub mod keyed_lock;
pub mod maintenance;
pub mod pending_buffer;
pub mod task_lifecycle_updater;
pub mod task_resolver;

// Re-export core types and components for easy access
pub use completion_reconciler::{BatchSummary, CompletionReconciler, HandleOutcome};
pub use engine_state_aggregator::{AggregateOutcome, EngineReport, EngineStateAggregator};
pub use keyed_lock::KeyedLocks;
pub use maintenance::{MaintenanceHandle, MaintenanceSweeper, SweepStats};
pub use pending_buffer::PendingMessageBuffer;
pub use task_lifecycle_updater::{AppliedUpdate, TaskLifecycleUpdater};
pub use task_resolver::TaskResolver;
