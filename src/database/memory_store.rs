//! In-memory task store

use super::task_store::TaskStore;
use crate::error::{ReconcilerError, Result};
use crate::models::{Task, TaskKind, TrackedTask};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// [`TaskStore`] over a lock-guarded map, for embedding and tests.
///
/// Lookups scan in `(kind, id)` order, so the lowest id wins when several tasks match.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<BTreeMap<(TaskKind, i64), Task>>,
    saves: AtomicUsize,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, as the task-creation workflow would
    pub fn insert(&self, task: impl Into<Task>) {
        let task = task.into();
        self.tasks.write().insert(task.key(), task);
    }

    pub fn get(&self, kind: TaskKind, id: i64) -> Option<Task> {
        self.tasks.read().get(&(kind, id)).cloned()
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn find_where(&self, kind: TaskKind, predicate: impl Fn(&Task) -> bool) -> Option<Task> {
        self.tasks
            .read()
            .range((kind, i64::MIN)..=(kind, i64::MAX))
            .map(|(_, task)| task)
            .find(|task| predicate(task))
            .cloned()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_by_external_id(&self, kind: TaskKind, job_id: &str) -> Result<Option<Task>> {
        Ok(self.find_where(kind, |task| task.external_job_ids().is_exactly(job_id)))
    }

    async fn find_by_external_id_set_containing(
        &self,
        kind: TaskKind,
        job_id: &str,
    ) -> Result<Option<Task>> {
        Ok(self.find_where(kind, |task| task.external_job_ids().contains(job_id)))
    }

    async fn find_by_id(&self, kind: TaskKind, id: i64) -> Result<Option<Task>> {
        Ok(self.get(kind, id))
    }

    async fn save(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write();
        let slot = tasks.get_mut(&task.key()).ok_or_else(|| {
            ReconcilerError::Persistence(format!("{} task {} not found", task.kind(), task.id()))
        })?;
        if slot.lock_version() != task.lock_version() {
            return Err(ReconcilerError::VersionConflict(format!(
                "{} task {} is at version {}, write was based on {}",
                task.kind(),
                task.id(),
                slot.lock_version(),
                task.lock_version()
            )));
        }
        let mut stored = task.clone();
        stored.set_lock_version(task.lock_version() + 1);
        *slot = stored;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
