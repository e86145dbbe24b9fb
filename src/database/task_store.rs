//! # Task Store
//!
//! Persistence seam for tracking tasks. The reconciler only needs lookups by external
//! job id, a reload by primary key, and a single-statement save.

use crate::error::Result;
use crate::models::{Task, TaskKind};
use async_trait::async_trait;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Task of `kind` whose job id set is exactly `{job_id}`
    async fn find_by_external_id(&self, kind: TaskKind, job_id: &str) -> Result<Option<Task>>;

    /// Task of `kind` whose job id set contains `job_id` as one element
    async fn find_by_external_id_set_containing(
        &self,
        kind: TaskKind,
        job_id: &str,
    ) -> Result<Option<Task>>;

    async fn find_by_id(&self, kind: TaskKind, id: i64) -> Result<Option<Task>>;

    /// Persist the reconciled fields of `task` in one write.
    ///
    /// The write only succeeds while the stored lock version still equals
    /// `task.lock_version()`, and it increments the stored version. A stale copy fails with
    /// [`ReconcilerError::VersionConflict`](crate::error::ReconcilerError::VersionConflict)
    /// so concurrent writers, in this process or another, cannot overwrite each other's merge.
    async fn save(&self, task: &Task) -> Result<()>;
}
