//! # Keyword Tracking Task
//!
//! Multi-engine tracking run: one keyword set checked on several search engines, with one
//! external job per engine.

use super::job_ids::JobIds;
use super::task::{TaskKind, TaskProgress, TrackedTask};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTrackingTask {
    pub id: i64,
    pub site_id: i64,
    pub search_engines: Vec<String>,
    pub external_job_ids: JobIds,
    #[serde(flatten)]
    pub progress: TaskProgress,
    /// Incremented by every successful save
    #[serde(default)]
    pub lock_version: i64,
    pub created_at: DateTime<Utc>,
}

impl KeywordTrackingTask {
    pub fn new(
        id: i64,
        site_id: i64,
        search_engines: Vec<String>,
        external_job_ids: JobIds,
        total_keywords: i32,
    ) -> Self {
        Self {
            id,
            site_id,
            search_engines,
            external_job_ids,
            progress: TaskProgress::new(total_keywords),
            lock_version: 0,
            created_at: Utc::now(),
        }
    }
}

impl TrackedTask for KeywordTrackingTask {
    fn id(&self) -> i64 {
        self.id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::KeywordTracking
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
