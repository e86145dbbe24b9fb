//! # Task Lifecycle Updater
//!
//! Applies aggregated progress to a task, persists it and announces lifecycle changes.
//!
//! Application and persistence are split so a replay pass can apply several buffered
//! messages in memory and write the task once. Each applied message still gets its own
//! audit record, built from the snapshot taken right after it was applied.

use crate::constants::events;
use crate::database::TaskStore;
use crate::error::{ReconcilerError, Result};
use crate::events::EventPublisher;
use crate::logging::{log_task_update, UpdateSource};
use crate::models::{ProgressUpdate, Task, TaskProgress, TrackedTask};
use crate::state_machine::TaskStatus;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Record of one message applied to a task in memory
#[derive(Debug, Clone)]
pub struct AppliedUpdate {
    pub job_id: String,
    pub message_id: Uuid,
    pub source: UpdateSource,
    pub from_status: TaskStatus,
    pub to_status: TaskStatus,
    /// Task progress immediately after this update
    pub snapshot: TaskProgress,
}

#[derive(Clone)]
pub struct TaskLifecycleUpdater {
    store: Arc<dyn TaskStore>,
    events: EventPublisher,
}

impl std::fmt::Debug for TaskLifecycleUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLifecycleUpdater")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl TaskLifecycleUpdater {
    pub fn new(store: Arc<dyn TaskStore>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    /// Apply an aggregated update in memory, enforcing the task state machine
    pub fn apply(
        &self,
        task: &mut Task,
        update: &ProgressUpdate,
        job_id: &str,
        message_id: Uuid,
        source: UpdateSource,
        now: DateTime<Utc>,
    ) -> Result<AppliedUpdate> {
        let from_status = task.status();
        if !from_status.can_transition_to(update.status) {
            return Err(ReconcilerError::StateTransition(format!(
                "task {} ({}) cannot move from {} to {}",
                task.id(),
                task.kind(),
                from_status,
                update.status
            )));
        }

        task.apply_update(update, now);

        Ok(AppliedUpdate {
            job_id: job_id.to_string(),
            message_id,
            source,
            from_status,
            to_status: task.status(),
            snapshot: task.progress().clone(),
        })
    }

    /// Persist the task once, then log and publish every applied update.
    ///
    /// Nothing is logged or published when the write fails.
    pub async fn persist(&self, task: &Task, applied: &[AppliedUpdate]) -> Result<()> {
        if applied.is_empty() {
            return Ok(());
        }

        self.store.save(task).await?;
        debug!(
            task_id = task.id(),
            task_kind = %task.kind(),
            updates = applied.len(),
            "Persisted reconciled task"
        );

        for update in applied {
            log_task_update(
                task,
                &update.snapshot,
                &update.job_id,
                &update.message_id,
                update.source,
            );
            self.publish(task, update);
        }
        Ok(())
    }

    fn publish(&self, task: &Task, update: &AppliedUpdate) {
        let context = json!({
            "task_id": task.id(),
            "task_kind": task.kind(),
            "job_id": update.job_id,
            "message_id": update.message_id,
            "source": update.source.as_str(),
            "from_status": update.from_status,
            "status": update.to_status,
            "progress_percent": update.snapshot.progress_percent,
            "processed_keywords": update.snapshot.processed_keywords,
            "error_message": update.snapshot.error_message,
        });

        self.events.publish(events::TASK_PROGRESS_UPDATED, context.clone());

        // Terminal events fire once, on the transition itself
        if update.from_status != update.to_status {
            match update.to_status {
                TaskStatus::Completed => self.events.publish(events::TASK_COMPLETED, context),
                TaskStatus::Failed => self.events.publish(events::TASK_FAILED, context),
                _ => {}
            }
        }
    }
}
