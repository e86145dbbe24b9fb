//! # Structured Logging Module
//!
//! Environment-aware structured logging. The task update record emitted here is the
//! audit trail of every reconciled completion message.

use crate::models::{TaskProgress, TrackedTask};
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` takes precedence over the environment default level.
/// `RANKWATCH_LOG_FORMAT=json` switches the console output to JSON lines.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json_output = std::env::var("RANKWATCH_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console_layer = if json_output {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // Embedding applications may already own the global subscriber
        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            json = json_output,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("RANKWATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Where an applied update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// The message currently being handled
    Live,
    /// A message replayed from the pending buffer
    Replay,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Replay => "replay",
        }
    }
}

/// Audit record for one applied completion message.
///
/// `progress` is the task state right after this message was applied, which differs from
/// the task's final state when several buffered messages are replayed in one pass.
pub fn log_task_update<T: TrackedTask + ?Sized>(
    task: &T,
    progress: &TaskProgress,
    job_id: &str,
    message_id: &uuid::Uuid,
    source: UpdateSource,
) {
    let engine_states = progress.engine_states.to_json();

    if progress.status.is_terminal() {
        tracing::warn!(
            task_id = task.id(),
            task_kind = %task.kind(),
            external_job_ids = %task.external_job_ids(),
            job_id = %job_id,
            message_id = %message_id,
            source = source.as_str(),
            status = %progress.status,
            progress_percent = progress.progress_percent,
            processed_keywords = progress.processed_keywords,
            error_message = progress.error_message.as_deref(),
            engine_states = %engine_states,
            timestamp = %Utc::now().to_rfc3339(),
            "TASK_UPDATE terminal"
        );
    } else {
        tracing::info!(
            task_id = task.id(),
            task_kind = %task.kind(),
            external_job_ids = %task.external_job_ids(),
            job_id = %job_id,
            message_id = %message_id,
            source = source.as_str(),
            status = %progress.status,
            progress_percent = progress.progress_percent,
            processed_keywords = progress.processed_keywords,
            engine_states = %engine_states,
            timestamp = %Utc::now().to_rfc3339(),
            "TASK_UPDATE"
        );
    }
}

/// Log a reconciliation failure with enough context for forensic replay
pub fn log_reconcile_error(
    operation: &str,
    task_id: Option<i64>,
    job_id: Option<&str>,
    error: &str,
    payload: &serde_json::Value,
) {
    tracing::error!(
        operation = %operation,
        task_id = task_id,
        job_id = job_id,
        error = %error,
        payload = %payload,
        timestamp = %Utc::now().to_rfc3339(),
        "RECONCILE_ERROR"
    );
}
