//! # PostgreSQL Task Store
//!
//! Both task kinds live in their own table with the same reconciliation columns:
//!
//! ```sql
//! external_job_ids   TEXT[]      -- one element per external job
//! status             TEXT        -- pending | processing | completed | failed
//! engine_states      JSONB       -- { "<job id>": { "percent": 40, "status": "processing" } }
//! progress_percent   SMALLINT
//! ```
//!
//! Exact lookups compare the whole array against `ARRAY[$1]`; fallback lookups use
//! `$1 = ANY(external_job_ids)`, so membership is an element match and never a substring
//! scan. `save` rewrites every reconciled column in one `UPDATE` guarded by
//! `lock_version`: a row changed by another reconciler process since it was read is not
//! overwritten, and the caller gets a version conflict to retry on.
//!
//! Several reconciler processes may therefore share one database; the in-process task
//! locks only reduce how often those conflicts happen.

use super::task_store::TaskStore;
use crate::config::ReconcilerConfig;
use crate::error::{ReconcilerError, Result};
use crate::models::{
    clamp_percent, EngineStates, JobIds, KeywordTrackingTask, PositionCheckTask, Task, TaskKind,
    TaskProgress, TrackedTask,
};
use crate::state_machine::TaskStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

const TASK_COLUMNS: &str = "id, site_id, external_job_ids, status, engine_states, \
     progress_percent, total_keywords, processed_keywords, error_message, started_at, \
     completed_at, lock_version, created_at";

#[derive(Debug, FromRow)]
struct ProgressColumns {
    id: i64,
    site_id: i64,
    external_job_ids: Vec<String>,
    status: String,
    engine_states: Json<EngineStates>,
    progress_percent: i16,
    total_keywords: i32,
    processed_keywords: i32,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    lock_version: i64,
    created_at: DateTime<Utc>,
}

impl ProgressColumns {
    fn progress(&self) -> Result<TaskProgress> {
        let status: TaskStatus = self
            .status
            .parse()
            .map_err(|e: String| ReconcilerError::Persistence(format!("task {}: {e}", self.id)))?;

        Ok(TaskProgress {
            status,
            engine_states: self.engine_states.0.clone(),
            progress_percent: clamp_percent(i64::from(self.progress_percent)),
            total_keywords: self.total_keywords,
            processed_keywords: self.processed_keywords,
            error_message: self.error_message.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct KeywordTrackingTaskRow {
    #[sqlx(flatten)]
    columns: ProgressColumns,
    search_engines: Vec<String>,
}

impl TryFrom<KeywordTrackingTaskRow> for Task {
    type Error = ReconcilerError;

    fn try_from(row: KeywordTrackingTaskRow) -> Result<Self> {
        let progress = row.columns.progress()?;
        Ok(Task::KeywordTracking(KeywordTrackingTask {
            id: row.columns.id,
            site_id: row.columns.site_id,
            search_engines: row.search_engines,
            external_job_ids: JobIds::from(row.columns.external_job_ids),
            progress,
            lock_version: row.columns.lock_version,
            created_at: row.columns.created_at,
        }))
    }
}

#[derive(Debug, FromRow)]
struct PositionCheckTaskRow {
    #[sqlx(flatten)]
    columns: ProgressColumns,
    search_engine: String,
}

impl TryFrom<PositionCheckTaskRow> for Task {
    type Error = ReconcilerError;

    fn try_from(row: PositionCheckTaskRow) -> Result<Self> {
        let progress = row.columns.progress()?;
        Ok(Task::PositionCheck(PositionCheckTask {
            id: row.columns.id,
            site_id: row.columns.site_id,
            search_engine: row.search_engine,
            external_job_ids: JobIds::from(row.columns.external_job_ids),
            progress,
            lock_version: row.columns.lock_version,
            created_at: row.columns.created_at,
        }))
    }
}

/// [`TaskStore`] backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Connect using `database_url` from the reconciler configuration
    pub async fn from_config(config: &ReconcilerConfig) -> Result<Self> {
        let database_url = config.database_url.as_deref().ok_or_else(|| {
            ReconcilerError::Configuration(
                "database_url is required for the PostgreSQL task store".to_string(),
            )
        })?;
        Self::connect(database_url).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ReconcilerError::Persistence(format!("migration failed: {e}")))
    }

    pub async fn health_check(&self) -> Result<bool> {
        let health: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(health == 1)
    }

    async fn fetch_one_where(
        &self,
        kind: TaskKind,
        predicate: &str,
        bind: impl Into<QueryArg>,
    ) -> Result<Option<Task>> {
        let sql = select_sql(kind, predicate);
        let arg = bind.into();

        match kind {
            TaskKind::KeywordTracking => {
                let query = sqlx::query_as::<_, KeywordTrackingTaskRow>(&sql);
                let row = match arg {
                    QueryArg::Text(value) => query.bind(value),
                    QueryArg::Id(value) => query.bind(value),
                }
                .fetch_optional(&self.pool)
                .await?;
                row.map(Task::try_from).transpose()
            }
            TaskKind::PositionCheck => {
                let query = sqlx::query_as::<_, PositionCheckTaskRow>(&sql);
                let row = match arg {
                    QueryArg::Text(value) => query.bind(value),
                    QueryArg::Id(value) => query.bind(value),
                }
                .fetch_optional(&self.pool)
                .await?;
                row.map(Task::try_from).transpose()
            }
        }
    }
}

enum QueryArg {
    Text(String),
    Id(i64),
}

impl From<&str> for QueryArg {
    fn from(value: &str) -> Self {
        QueryArg::Text(value.to_string())
    }
}

impl From<i64> for QueryArg {
    fn from(value: i64) -> Self {
        QueryArg::Id(value)
    }
}

fn kind_columns(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::KeywordTracking => "search_engines",
        TaskKind::PositionCheck => "search_engine",
    }
}

fn select_sql(kind: TaskKind, predicate: &str) -> String {
    format!(
        "SELECT {TASK_COLUMNS}, {} FROM {} WHERE {predicate} ORDER BY id LIMIT 1",
        kind_columns(kind),
        kind.table_name()
    )
}

fn update_sql(kind: TaskKind) -> String {
    format!(
        "UPDATE {} SET engine_states = $2, status = $3, progress_percent = $4, \
         processed_keywords = $5, error_message = $6, started_at = $7, completed_at = $8, \
         lock_version = lock_version + 1, updated_at = NOW() \
         WHERE id = $1 AND lock_version = $9",
        kind.table_name()
    )
}

fn current_version_sql(kind: TaskKind) -> String {
    format!("SELECT lock_version FROM {} WHERE id = $1", kind.table_name())
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[instrument(skip(self))]
    async fn find_by_external_id(&self, kind: TaskKind, job_id: &str) -> Result<Option<Task>> {
        self.fetch_one_where(kind, "external_job_ids = ARRAY[$1]::TEXT[]", job_id)
            .await
    }

    #[instrument(skip(self))]
    async fn find_by_external_id_set_containing(
        &self,
        kind: TaskKind,
        job_id: &str,
    ) -> Result<Option<Task>> {
        self.fetch_one_where(kind, "$1 = ANY(external_job_ids)", job_id)
            .await
    }

    async fn find_by_id(&self, kind: TaskKind, id: i64) -> Result<Option<Task>> {
        self.fetch_one_where(kind, "id = $1", id).await
    }

    #[instrument(skip(self, task), fields(task_id = task.id(), kind = %task.kind()))]
    async fn save(&self, task: &Task) -> Result<()> {
        let progress = task.progress();
        let result = sqlx::query(&update_sql(task.kind()))
            .bind(task.id())
            .bind(Json(&progress.engine_states))
            .bind(progress.status.to_string())
            .bind(i16::from(progress.progress_percent))
            .bind(progress.processed_keywords)
            .bind(progress.error_message.as_deref())
            .bind(progress.started_at)
            .bind(progress.completed_at)
            .bind(task.lock_version())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let current: Option<i64> = sqlx::query_scalar(&current_version_sql(task.kind()))
                .bind(task.id())
                .fetch_optional(&self.pool)
                .await?;

            return Err(match current {
                Some(version) => ReconcilerError::VersionConflict(format!(
                    "{} task {} is at version {version}, write was based on {}",
                    task.kind(),
                    task.id(),
                    task.lock_version()
                )),
                None => ReconcilerError::Persistence(format!(
                    "{} task {} not found",
                    task.kind(),
                    task.id()
                )),
            });
        }

        debug!(status = %progress.status, "Task progress saved");
        Ok(())
    }
}
