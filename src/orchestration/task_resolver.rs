//! # Task Resolver
//!
//! Finds the local task that owns an external job id. Exact single-id matches are tried
//! for every task kind before set-membership matches; the first hit wins.

use crate::database::TaskStore;
use crate::error::Result;
use crate::models::{Task, TaskKind, TrackedTask};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct TaskResolver {
    store: Arc<dyn TaskStore>,
}

impl TaskResolver {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Resolve `job_id` to its task, or `None` if no task claims it yet
    pub async fn resolve(&self, job_id: &str) -> Result<Option<Task>> {
        for kind in TaskKind::ALL {
            if let Some(task) = self.store.find_by_external_id(kind, job_id).await? {
                debug!(job_id = %job_id, task_id = task.id(), kind = %kind, "Resolved by exact job id");
                return Ok(Some(task));
            }
        }

        for kind in TaskKind::ALL {
            if let Some(task) = self
                .store
                .find_by_external_id_set_containing(kind, job_id)
                .await?
            {
                debug!(job_id = %job_id, task_id = task.id(), kind = %kind, "Resolved by job id set membership");
                return Ok(Some(task));
            }
        }

        Ok(None)
    }

    /// Fresh copy of `task` from the store
    pub async fn reload(&self, task: &Task) -> Result<Option<Task>> {
        self.store.find_by_id(task.kind(), task.id()).await
    }
}
