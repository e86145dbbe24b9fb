//! Test fixtures: stores, caches and reconcilers with injectable failures

#![allow(dead_code)]

use async_trait::async_trait;
use rankwatch_core::cache::{CacheError, CacheResult, InMemoryMessageCache, MessageCache};
use rankwatch_core::database::{InMemoryTaskStore, TaskStore};
use rankwatch_core::messaging::PendingMessage;
use rankwatch_core::models::{JobIds, KeywordTrackingTask, PositionCheckTask, Task, TaskKind};
use rankwatch_core::{CompletionReconciler, ReconcilerConfig, ReconcilerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn keyword_task(id: i64, job_ids: &str) -> KeywordTrackingTask {
    let ids = JobIds::parse_delimited(job_ids);
    let engines = ids.iter().map(|id| format!("engine-{id}")).collect();
    KeywordTrackingTask::new(id, 100 + id, engines, ids, 120)
}

pub fn position_task(id: i64, job_id: &str) -> PositionCheckTask {
    PositionCheckTask::new(id, 100 + id, "google", job_id, 30)
}

/// Store wrapper whose writes can be switched to fail
#[derive(Debug, Default)]
pub struct FlakyTaskStore {
    pub inner: InMemoryTaskStore,
    fail_saves: AtomicBool,
    fail_lookups: AtomicBool,
}

impl FlakyTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    fn check_lookup(&self) -> Result<()> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(ReconcilerError::Persistence("lookup timed out".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FlakyTaskStore {
    async fn find_by_external_id(&self, kind: TaskKind, job_id: &str) -> Result<Option<Task>> {
        self.check_lookup()?;
        self.inner.find_by_external_id(kind, job_id).await
    }

    async fn find_by_external_id_set_containing(
        &self,
        kind: TaskKind,
        job_id: &str,
    ) -> Result<Option<Task>> {
        self.check_lookup()?;
        self.inner.find_by_external_id_set_containing(kind, job_id).await
    }

    async fn find_by_id(&self, kind: TaskKind, id: i64) -> Result<Option<Task>> {
        self.check_lookup()?;
        self.inner.find_by_id(kind, id).await
    }

    async fn save(&self, task: &Task) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ReconcilerError::Persistence("connection reset".to_string()));
        }
        self.inner.save(task).await
    }
}

/// Cache that refuses every call
#[derive(Debug, Default)]
pub struct UnavailableCache;

#[async_trait]
impl MessageCache for UnavailableCache {
    async fn get(&self, _key: &str) -> CacheResult<Vec<PendingMessage>> {
        Err(CacheError::ConnectionError("cache unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _: Vec<PendingMessage>, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::ConnectionError("cache unavailable".to_string()))
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::ConnectionError("cache unavailable".to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "unavailable"
    }
}

pub struct Harness {
    pub store: Arc<InMemoryTaskStore>,
    pub cache: Arc<InMemoryMessageCache>,
    pub reconciler: CompletionReconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let cache = Arc::new(InMemoryMessageCache::new());
        let reconciler = CompletionReconciler::new(store.clone(), cache.clone(), config);
        Self {
            store,
            cache,
            reconciler,
        }
    }

    pub fn task(&self, kind: TaskKind, id: i64) -> Task {
        self.store.get(kind, id).expect("task should exist")
    }
}
