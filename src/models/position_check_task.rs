//! # Position Check Task
//!
//! Single-engine position check backed by one external job.

use super::job_ids::JobIds;
use super::task::{TaskKind, TaskProgress, TrackedTask};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionCheckTask {
    pub id: i64,
    pub site_id: i64,
    pub search_engine: String,
    pub external_job_ids: JobIds,
    #[serde(flatten)]
    pub progress: TaskProgress,
    #[serde(default)]
    pub lock_version: i64,
    pub created_at: DateTime<Utc>,
}

impl PositionCheckTask {
    pub fn new(
        id: i64,
        site_id: i64,
        search_engine: impl Into<String>,
        job_id: impl Into<String>,
        total_keywords: i32,
    ) -> Self {
        let mut external_job_ids = JobIds::new();
        external_job_ids.insert(job_id);

        Self {
            id,
            site_id,
            search_engine: search_engine.into(),
            external_job_ids,
            progress: TaskProgress::new(total_keywords),
            lock_version: 0,
            created_at: Utc::now(),
        }
    }
}

impl TrackedTask for PositionCheckTask {
    fn id(&self) -> i64 {
        self.id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::PositionCheck
    }

    fn external_job_ids(&self) -> &JobIds {
        &self.external_job_ids
    }

    fn lock_version(&self) -> i64 {
        self.lock_version
    }

    fn progress(&self) -> &TaskProgress {
        &self.progress
    }

    fn progress_mut(&mut self) -> &mut TaskProgress {
        &mut self.progress
    }
}
