//! # Engine-State Aggregator
//!
//! Merges one job's reported progress into a task's per-engine state map and recomputes
//! the task-level status and percentage.
//!
//! ## Merge rules
//!
//! 1. Every known job id without an entry is initialized to `{0, processing}`.
//! 2. The reporting job's percent becomes `max(stored, incoming)`; its status changes only
//!    when the incoming status is `completed` or `failed`.
//! 3. The aggregate percent is the floored mean over known job ids (or over the stored
//!    entries while the id set is unknown), never lower than the previous aggregate.
//! 4. A `failed` report fails the whole task; failure is sticky. Otherwise the task
//!    completes once every known job is `completed`, which forces the percent to 100.
//!
//! The aggregator is pure: it reads the task and returns a [`ProgressUpdate`] for the
//! lifecycle updater to apply.

use crate::models::{EngineStates, ProgressUpdate, TrackedTask};
use crate::state_machine::{EngineStatus, TaskStatus};
use chrono::{DateTime, Utc};

/// One job's normalized report
#[derive(Debug, Clone, Copy)]
pub struct EngineReport<'a> {
    pub job_id: &'a str,
    pub status: Option<&'a EngineStatus>,
    /// Already clamped into `0..=100`
    pub percent: u8,
    pub error: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    Applied(ProgressUpdate),
    /// The task already completed; late reports change nothing
    IgnoredTerminal,
}

#[derive(Debug, Clone)]
pub struct EngineStateAggregator {
    default_failure_message: String,
}

impl EngineStateAggregator {
    pub fn new(default_failure_message: impl Into<String>) -> Self {
        Self {
            default_failure_message: default_failure_message.into(),
        }
    }

    pub fn aggregate<T: TrackedTask + ?Sized>(
        &self,
        task: &T,
        report: EngineReport<'_>,
        now: DateTime<Utc>,
    ) -> AggregateOutcome {
        let progress = task.progress();
        if progress.status == TaskStatus::Completed {
            return AggregateOutcome::IgnoredTerminal;
        }

        let known_ids = task.external_job_ids();
        let mut engine_states = progress.engine_states.clone();

        for job_id in known_ids.iter() {
            engine_states.entry_or_default(job_id);
        }

        merge_report(&mut engine_states, &report, now);

        let computed_percent = if !known_ids.is_empty() {
            mean_percent(known_ids.iter().filter_map(|id| engine_states.get(id)).map(|s| s.percent))
        } else if !engine_states.is_empty() {
            mean_percent(engine_states.iter().map(|(_, s)| s.percent))
        } else {
            report.percent
        };

        let all_completed = if known_ids.is_empty() {
            engine_states.iter().all(|(_, state)| state.is_completed())
        } else {
            known_ids
                .iter()
                .all(|id| engine_states.get(id).is_some_and(|state| state.is_completed()))
        };

        let reported_failure = report.status == Some(&EngineStatus::Failed);
        let monotonic_percent = computed_percent.max(progress.progress_percent);

        let (status, progress_percent) = if progress.status == TaskStatus::Failed || reported_failure
        {
            (TaskStatus::Failed, monotonic_percent)
        } else if all_completed {
            (TaskStatus::Completed, 100)
        } else {
            (TaskStatus::Processing, monotonic_percent)
        };

        let processed_keywords = if status == TaskStatus::Completed {
            progress.total_keywords
        } else {
            let estimated = i64::from(progress.total_keywords) * i64::from(progress_percent) / 100;
            progress
                .processed_keywords
                .max(i32::try_from(estimated).unwrap_or(i32::MAX))
        };

        // First failure wins: the error text is only recorded on the transition
        let error_message = (status == TaskStatus::Failed && progress.status != TaskStatus::Failed)
            .then(|| {
                report
                    .error
                    .unwrap_or(self.default_failure_message.as_str())
                    .to_string()
            });

        AggregateOutcome::Applied(ProgressUpdate {
            engine_states,
            status,
            progress_percent,
            processed_keywords,
            error_message,
        })
    }
}

fn merge_report(engine_states: &mut EngineStates, report: &EngineReport<'_>, now: DateTime<Utc>) {
    let state = engine_states.entry_or_default(report.job_id);
    let before = state.clone();

    state.percent = state.percent.max(report.percent);
    match report.status {
        Some(EngineStatus::Completed) => state.status = EngineStatus::Completed,
        Some(EngineStatus::Failed) => state.status = EngineStatus::Failed,
        _ => {}
    }
    if let Some(status) = report.status {
        state.last_reported = Some(status.to_string());
    }

    // Duplicates leave the entry byte-for-byte unchanged
    if *state != before {
        state.updated_at = Some(now);
    }
}

fn mean_percent(percents: impl Iterator<Item = u8>) -> u8 {
    let (sum, count) = percents.fold((0u32, 0u32), |(sum, count), percent| {
        (sum + u32::from(percent), count + 1)
    });
    if count == 0 {
        0
    } else {
        (sum / count) as u8
    }
}
