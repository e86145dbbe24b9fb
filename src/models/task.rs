//! # Task Model
//!
//! Tracking tasks reconciled against external job completion messages.
//!
//! ## Overview
//!
//! Two task kinds exist: multi-engine keyword tracking runs and single-engine position
//! checks. Both carry the same reconciliation shape, a [`TaskProgress`] record, and are
//! exposed through the [`TrackedTask`] interface so the aggregator is written once.
//! [`Task`] is the closed set of kinds handed around by stores and the reconciler.

use super::engine_state::EngineStates;
use super::job_ids::JobIds;
use super::keyword_tracking_task::KeywordTrackingTask;
use super::position_check_task::PositionCheckTask;
use crate::state_machine::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    KeywordTracking,
    PositionCheck,
}

impl TaskKind {
    /// Probe order used by the resolver
    pub const ALL: [TaskKind; 2] = [TaskKind::KeywordTracking, TaskKind::PositionCheck];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::KeywordTracking => "keyword_tracking_tasks",
            Self::PositionCheck => "position_check_tasks",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeywordTracking => write!(f, "keyword_tracking"),
            Self::PositionCheck => write!(f, "position_check"),
        }
    }
}

/// Reconciliation state shared by every task kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub status: TaskStatus,
    pub engine_states: EngineStates,
    pub progress_percent: u8,
    pub total_keywords: i32,
    pub processed_keywords: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    pub fn new(total_keywords: i32) -> Self {
        Self {
            status: TaskStatus::Pending,
            engine_states: EngineStates::new(),
            progress_percent: 0,
            total_keywords,
            processed_keywords: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Overwrite the reconciled fields and stamp lifecycle timestamps.
    ///
    /// `started_at` is set on the first move out of `pending`; `completed_at` on the move
    /// into a terminal status.
    pub fn apply(&mut self, update: &ProgressUpdate, now: DateTime<Utc>) {
        let previous = self.status;

        self.engine_states = update.engine_states.clone();
        self.status = update.status;
        self.progress_percent = update.progress_percent;
        self.processed_keywords = update.processed_keywords;
        if update.error_message.is_some() {
            self.error_message = update.error_message.clone();
        }

        if update.status != TaskStatus::Pending && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if update.status.is_terminal() && !previous.is_terminal() {
            self.completed_at = Some(now);
        }
    }
}

/// Fields computed by the engine-state aggregator for one applied message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub engine_states: EngineStates,
    pub status: TaskStatus,
    pub progress_percent: u8,
    pub processed_keywords: i32,
    pub error_message: Option<String>,
}

/// Common interface over task kinds
pub trait TrackedTask {
    fn id(&self) -> i64;

    fn kind(&self) -> TaskKind;

    fn external_job_ids(&self) -> &JobIds;

    /// Optimistic concurrency token: the stored version this copy was read at
    fn lock_version(&self) -> i64;

    fn progress(&self) -> &TaskProgress;

    fn progress_mut(&mut self) -> &mut TaskProgress;

    fn status(&self) -> TaskStatus {
        self.progress().status
    }

    fn engine_states(&self) -> &EngineStates {
        &self.progress().engine_states
    }

    fn apply_update(&mut self, update: &ProgressUpdate, now: DateTime<Utc>) {
        self.progress_mut().apply(update, now);
    }
}

/// A tracking task of either kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    KeywordTracking(KeywordTrackingTask),
    PositionCheck(PositionCheckTask),
}

impl Task {
    /// Lock and lookup key, unique across kinds
    pub fn key(&self) -> (TaskKind, i64) {
        (self.kind(), self.id())
    }

    /// Used by stores after a successful write
    pub fn set_lock_version(&mut self, lock_version: i64) {
        match self {
            Self::KeywordTracking(task) => task.lock_version = lock_version,
            Self::PositionCheck(task) => task.lock_version = lock_version,
        }
    }
}

impl TrackedTask for Task {
    fn id(&self) -> i64 {
        match self {
            Self::KeywordTracking(task) => task.id(),
            Self::PositionCheck(task) => task.id(),
        }
    }

    fn kind(&self) -> TaskKind {
        match self {
            Self::KeywordTracking(task) => task.kind(),
            Self::PositionCheck(task) => task.kind(),
        }
    }

    fn external_job_ids(&self) -> &JobIds {
        match self {
            Self::KeywordTracking(task) => task.external_job_ids(),
            Self::PositionCheck(task) => task.external_job_ids(),
        }
    }

    fn lock_version(&self) -> i64 {
        match self {
            Self::KeywordTracking(task) => task.lock_version(),
            Self::PositionCheck(task) => task.lock_version(),
        }
    }

    fn progress(&self) -> &TaskProgress {
        match self {
            Self::KeywordTracking(task) => task.progress(),
            Self::PositionCheck(task) => task.progress(),
        }
    }

    fn progress_mut(&mut self) -> &mut TaskProgress {
        match self {
            Self::KeywordTracking(task) => task.progress_mut(),
            Self::PositionCheck(task) => task.progress_mut(),
        }
    }
}

impl From<KeywordTrackingTask> for Task {
    fn from(task: KeywordTrackingTask) -> Self {
        Self::KeywordTracking(task)
    }
}

impl From<PositionCheckTask> for Task {
    fn from(task: PositionCheckTask) -> Self {
        Self::PositionCheck(task)
    }
}
