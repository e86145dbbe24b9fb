//! # Completion Reconciler
//!
//! Ingress entry point for completion messages from the external job service.
//!
//! ## Flow
//!
//! 1. Parse the raw payload; messages without a job id are dropped.
//! 2. Resolve the owning task. Unresolved messages go to the pending buffer, after which
//!    the task is resolved once more so a task created in the meantime picks them up.
//! 3. Under the task's lock, re-read the task, replay pending messages buffered under any
//!    of its job ids (oldest first per id), then apply the current message.
//! 4. Persist once for the whole pass and acknowledge the replayed buffer entries.
//!
//! Persistence and lookup failures propagate to the caller, whose redelivery is the
//! recovery path. Buffer failures never do.

use super::engine_state_aggregator::{AggregateOutcome, EngineReport, EngineStateAggregator};
use super::keyed_lock::KeyedLocks;
use super::maintenance::MaintenanceSweeper;
use super::pending_buffer::PendingMessageBuffer;
use super::task_lifecycle_updater::{AppliedUpdate, TaskLifecycleUpdater};
use super::task_resolver::TaskResolver;
use crate::cache::MessageCache;
use crate::config::ReconcilerConfig;
use crate::constants::events;
use crate::database::TaskStore;
use crate::error::{ReconcilerError, Result};
use crate::events::EventPublisher;
use crate::logging::{log_reconcile_error, UpdateSource};
use crate::messaging::{CompletionMessage, PendingMessage};
use crate::models::{Task, TaskKind, TrackedTask};
use crate::state_machine::TaskStatus;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// What happened to one completion message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandleOutcome {
    /// No job id; nothing to buffer under
    Dropped,
    /// No owning task yet; held in the pending buffer
    Buffered { job_id: String },
    /// No owning task and the pending buffer could not store it; the message is lost
    Unbuffered { job_id: String },
    /// Merged into the task and persisted
    Applied {
        task_id: i64,
        task_kind: TaskKind,
        status: TaskStatus,
        progress_percent: u8,
        /// Buffered messages applied ahead of this one
        replayed: usize,
    },
    /// The task already completed; nothing persisted
    Ignored { task_id: i64, task_kind: TaskKind },
}

/// Totals for one delivery batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub applied: usize,
    pub buffered: usize,
    /// Unresolved messages the pending buffer failed to store
    pub unbuffered: usize,
    pub dropped: usize,
    pub ignored: usize,
    pub failed: usize,
    /// Distinct tasks left completed by this batch
    pub tasks_completed: usize,
    /// Distinct tasks left failed by this batch
    pub tasks_failed: usize,
    pub duration_ms: u64,
}

pub struct CompletionReconciler {
    resolver: TaskResolver,
    buffer: Arc<PendingMessageBuffer>,
    aggregator: EngineStateAggregator,
    updater: TaskLifecycleUpdater,
    task_locks: Arc<KeyedLocks<(TaskKind, i64)>>,
    events: EventPublisher,
    config: ReconcilerConfig,
}

impl std::fmt::Debug for CompletionReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionReconciler")
            .field("buffer", &self.buffer)
            .field("task_locks", &self.task_locks.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CompletionReconciler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        cache: Arc<dyn MessageCache>,
        config: ReconcilerConfig,
    ) -> Self {
        let events = EventPublisher::new(config.event_channel_capacity);
        Self::with_event_publisher(store, cache, config, events)
    }

    /// Build a reconciler that publishes on an existing channel
    pub fn with_event_publisher(
        store: Arc<dyn TaskStore>,
        cache: Arc<dyn MessageCache>,
        config: ReconcilerConfig,
        events: EventPublisher,
    ) -> Self {
        Self {
            resolver: TaskResolver::new(Arc::clone(&store)),
            buffer: Arc::new(PendingMessageBuffer::new(cache, config.pending_ttl())),
            aggregator: EngineStateAggregator::new(config.default_failure_message.clone()),
            updater: TaskLifecycleUpdater::new(store, events.clone()),
            task_locks: Arc::new(KeyedLocks::new()),
            events,
            config,
        }
    }

    pub fn buffer(&self) -> &Arc<PendingMessageBuffer> {
        &self.buffer
    }

    pub fn task_locks(&self) -> &Arc<KeyedLocks<(TaskKind, i64)>> {
        &self.task_locks
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Sweeper over this reconciler's buffer and lock table
    pub fn maintenance_sweeper(&self) -> MaintenanceSweeper {
        MaintenanceSweeper::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.task_locks),
            self.config.sweep_interval(),
        )
    }

    /// Handle one raw completion payload
    pub async fn handle(&self, payload: Value) -> Result<HandleOutcome> {
        self.handle_message(CompletionMessage::from_value(payload))
            .await
    }

    #[instrument(skip(self, message), fields(message_id = %message.message_id))]
    pub async fn handle_message(&self, message: CompletionMessage) -> Result<HandleOutcome> {
        let Some(job_id) = message.job_id.clone() else {
            warn!(payload = %message.payload, "Completion message has no job_id or task_id, dropping");
            self.events.publish(
                events::COMPLETION_DROPPED,
                json!({ "message_id": message.message_id, "payload": message.payload }),
            );
            return Ok(HandleOutcome::Dropped);
        };

        let resolved = match self.resolver.resolve(&job_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                log_reconcile_error("resolve", None, Some(&job_id), &e.to_string(), &message.payload);
                return Err(e);
            }
        };

        match resolved {
            Some(task) => self.reconcile(task, &job_id, Some(&message)).await,
            None => self.buffer_unresolved(&job_id, message).await,
        }
    }

    /// Handle a delivery batch, at most `max_concurrent_messages` at a time
    pub async fn handle_batch(&self, payloads: Vec<Value>) -> BatchSummary {
        let start = Instant::now();
        let results: Vec<Result<HandleOutcome>> = stream::iter(payloads)
            .map(|payload| self.handle(payload))
            .buffer_unordered(self.config.max_concurrent_messages.max(1))
            .collect()
            .await;

        let mut summary = BatchSummary {
            processed: results.len(),
            ..BatchSummary::default()
        };
        let mut completed = HashSet::new();
        let mut failed = HashSet::new();

        for result in results {
            match result {
                Ok(HandleOutcome::Applied {
                    task_id,
                    task_kind,
                    status,
                    ..
                }) => {
                    summary.applied += 1;
                    match status {
                        TaskStatus::Completed => {
                            completed.insert((task_kind, task_id));
                        }
                        TaskStatus::Failed => {
                            failed.insert((task_kind, task_id));
                        }
                        _ => {}
                    }
                }
                Ok(HandleOutcome::Buffered { .. }) => summary.buffered += 1,
                Ok(HandleOutcome::Unbuffered { .. }) => summary.unbuffered += 1,
                Ok(HandleOutcome::Dropped) => summary.dropped += 1,
                Ok(HandleOutcome::Ignored { .. }) => summary.ignored += 1,
                Err(_) => summary.failed += 1,
            }
        }

        summary.tasks_completed = completed.len();
        summary.tasks_failed = failed.len();
        summary.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            processed = summary.processed,
            applied = summary.applied,
            buffered = summary.buffered,
            unbuffered = summary.unbuffered,
            dropped = summary.dropped,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Completion batch handled"
        );
        summary
    }

    async fn buffer_unresolved(
        &self,
        job_id: &str,
        message: CompletionMessage,
    ) -> Result<HandleOutcome> {
        let stored = self.buffer.append(job_id, message.to_pending()).await;
        if stored {
            warn!(
                job_id = %job_id,
                payload = %message.payload,
                "No task owns this job id yet, buffering completion message"
            );
            self.events.publish(
                events::COMPLETION_BUFFERED,
                json!({ "job_id": job_id, "message_id": message.message_id }),
            );
        }

        // The task may have been created between the lookup and the append
        let recheck = match self.resolver.resolve(job_id).await {
            Ok(Some(task)) => {
                debug!(job_id = %job_id, task_id = task.id(), "Task appeared while buffering, replaying now");
                let live = (!stored).then_some(&message);
                return self.reconcile(task, job_id, live).await;
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    error = %e,
                    payload = %message.payload,
                    "Re-resolution after buffering failed"
                );
                Some(e)
            }
        };

        if stored {
            return Ok(HandleOutcome::Buffered {
                job_id: job_id.to_string(),
            });
        }

        let reason = recheck.map_or_else(
            || "pending buffer unavailable".to_string(),
            |e| format!("pending buffer unavailable; {e}"),
        );
        log_reconcile_error("buffer", None, Some(job_id), &reason, &message.payload);
        self.events.publish(
            events::COMPLETION_DROPPED,
            json!({
                "job_id": job_id,
                "message_id": message.message_id,
                "reason": reason,
                "payload": message.payload,
            }),
        );
        Ok(HandleOutcome::Unbuffered {
            job_id: job_id.to_string(),
        })
    }

    /// Replay pending messages and apply `live` against `task` under its lock.
    ///
    /// A save rejected as stale means another writer got there first; the pass is rerun
    /// from a fresh read, up to `max_save_attempts` times.
    async fn reconcile(
        &self,
        task: Task,
        job_id: &str,
        live: Option<&CompletionMessage>,
    ) -> Result<HandleOutcome> {
        let _guard = self.task_locks.lock(task.key()).await;
        let max_attempts = self.config.max_save_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.reconcile_pass(&task, job_id, live).await {
                Err(ReconcilerError::VersionConflict(reason)) if attempt < max_attempts => {
                    debug!(
                        task_id = task.id(),
                        job_id = %job_id,
                        attempt = attempt,
                        reason = %reason,
                        "Task changed concurrently, retrying reconcile pass"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    let payload = live.map(|m| m.payload.clone()).unwrap_or(Value::Null);
                    log_reconcile_error("reconcile", Some(task.id()), Some(job_id), &e.to_string(), &payload);
                    return Err(e);
                }
                Ok(outcome) => return Ok(outcome),
            }
        }
    }

    /// One read-merge-write pass; the caller holds the task lock
    async fn reconcile_pass(
        &self,
        resolved: &Task,
        job_id: &str,
        live: Option<&CompletionMessage>,
    ) -> Result<HandleOutcome> {
        let mut task = self
            .resolver
            .reload(resolved)
            .await?
            .unwrap_or_else(|| resolved.clone());

        let mut buffer_ids: Vec<String> = task.external_job_ids().to_vec();
        if !task.external_job_ids().contains(job_id) {
            buffer_ids.push(job_id.to_string());
        }

        if task.status() == TaskStatus::Completed {
            // Nothing can change a completed task; stale buffers are released
            for buffer_id in &buffer_ids {
                self.buffer.clear(buffer_id).await;
            }
            info!(
                task_id = task.id(),
                task_kind = %task.kind(),
                job_id = %job_id,
                "Task already completed, ignoring completion message"
            );
            return Ok(HandleOutcome::Ignored {
                task_id: task.id(),
                task_kind: task.kind(),
            });
        }

        let now = Utc::now();
        let mut applied: Vec<AppliedUpdate> = Vec::new();
        let mut drained: Vec<(String, Vec<PendingMessage>)> = Vec::new();
        let mut replayed = 0;

        for buffer_id in buffer_ids {
            let pending = self.buffer.drain(&buffer_id).await;
            if pending.is_empty() {
                continue;
            }
            for entry in &pending {
                let message = entry.to_completion();
                if let Some(update) =
                    self.apply_message(&mut task, &buffer_id, &message, UpdateSource::Replay, now)?
                {
                    applied.push(update);
                }
                replayed += 1;
            }
            drained.push((buffer_id, pending));
        }

        if let Some(message) = live {
            if let Some(update) =
                self.apply_message(&mut task, job_id, message, UpdateSource::Live, now)?
            {
                applied.push(update);
            }
        }

        self.updater.persist(&task, &applied).await?;

        for (buffer_id, pending) in &drained {
            self.buffer.acknowledge(buffer_id, pending).await;
            self.events.publish(
                events::COMPLETION_REPLAYED,
                json!({ "task_id": task.id(), "job_id": buffer_id, "count": pending.len() }),
            );
        }

        if applied.is_empty() {
            return Ok(HandleOutcome::Ignored {
                task_id: task.id(),
                task_kind: task.kind(),
            });
        }

        Ok(HandleOutcome::Applied {
            task_id: task.id(),
            task_kind: task.kind(),
            status: task.status(),
            progress_percent: task.progress().progress_percent,
            replayed,
        })
    }

    /// Aggregate one message into `task` in memory; `None` when the task is completed
    fn apply_message(
        &self,
        task: &mut Task,
        job_id: &str,
        message: &CompletionMessage,
        source: UpdateSource,
        now: chrono::DateTime<Utc>,
    ) -> Result<Option<AppliedUpdate>> {
        let report = EngineReport {
            job_id,
            status: message.status.as_ref(),
            percent: message.clamped_percent(),
            error: message.error.as_deref(),
        };

        match self.aggregator.aggregate(task, report, now) {
            AggregateOutcome::Applied(update) => self
                .updater
                .apply(task, &update, job_id, message.message_id, source, now)
                .map(Some),
            AggregateOutcome::IgnoredTerminal => {
                debug!(
                    task_id = task.id(),
                    job_id = %job_id,
                    message_id = %message.message_id,
                    "Task completed earlier in this pass, skipping message"
                );
                Ok(None)
            }
        }
    }
}
