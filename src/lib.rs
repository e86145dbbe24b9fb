#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # RankWatch Core
//!
//! Completion-event reconciliation engine for search-engine rank tracking.
//!
//! ## Overview
//!
//! Ranking work is executed by an external long-running job service. That service reports
//! progress and completion through out-of-band completion messages that may be duplicated,
//! reordered, or delivered before the local task they refer to has been created. This crate
//! ingests those messages, maps them onto the owning local task, merges per-engine progress
//! into one aggregate task state, and guarantees that the aggregate is monotonic and
//! eventually consistent.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Aggregate and per-engine status types, status normalization
//! - [`models`] - Task kinds, job id sets and engine state maps
//! - [`messaging`] - Inbound completion message parsing
//! - [`cache`] - Keyed TTL store backing the pending message buffer
//! - [`database`] - Task persistence (in-memory and PostgreSQL)
//! - [`events`] - Lifecycle event publishing
//! - [`orchestration`] - Resolver, buffer, aggregator, updater and the ingress entry point
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rankwatch_core::cache::InMemoryMessageCache;
//! use rankwatch_core::config::ReconcilerConfig;
//! use rankwatch_core::database::InMemoryTaskStore;
//! use rankwatch_core::orchestration::CompletionReconciler;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> rankwatch_core::Result<()> {
//! let reconciler = CompletionReconciler::new(
//!     Arc::new(InMemoryTaskStore::new()),
//!     Arc::new(InMemoryMessageCache::new()),
//!     ReconcilerConfig::default(),
//! );
//!
//! reconciler
//!     .handle(json!({"job_id": "yandex-1842", "status": "running", "percent": 40}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod state_machine;

pub use config::ReconcilerConfig;
pub use error::{ReconcilerError, Result};
pub use messaging::CompletionMessage;
pub use models::{EngineState, EngineStates, JobIds, Task, TaskKind, TrackedTask};
pub use orchestration::{BatchSummary, CompletionReconciler, HandleOutcome};
pub use state_machine::{normalize_status, EngineStatus, TaskStatus};
