//! # Completion Messages
//!
//! Inbound notifications from the external job service. Deliveries are loosely shaped, so
//! parsing is tolerant: `job_id` or `task_id` name the job, `percent` may arrive as an
//! integer, float or numeric string, and `status` uses a free-form vocabulary that is
//! normalized on the way in. The raw payload is kept for buffering and forensic replay.

use crate::models::clamp_percent;
use crate::state_machine::{normalize_status, EngineStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Keys accepted for the job identifier, in priority order
const JOB_ID_KEYS: [&str; 2] = ["job_id", "task_id"];

/// Parsed view of one raw completion message
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionMessage {
    /// Correlation id assigned on receipt
    pub message_id: Uuid,
    pub job_id: Option<String>,
    /// Normalized status; `None` when absent or empty
    pub status: Option<EngineStatus>,
    pub percent: Option<i64>,
    pub error: Option<String>,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl CompletionMessage {
    /// Parse a raw delivery. Never fails; missing or malformed fields are absent.
    pub fn from_value(payload: Value) -> Self {
        let job_id = JOB_ID_KEYS
            .iter()
            .find_map(|key| payload.get(*key).and_then(identifier_from_value));

        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .and_then(normalize_status);

        let percent = payload.get("percent").and_then(percent_from_value);

        let error = payload
            .get("error")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        Self {
            message_id: Uuid::new_v4(),
            job_id,
            status,
            percent,
            error,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Reported percentage clamped into `0..=100`; absent counts as 0
    pub fn clamped_percent(&self) -> u8 {
        clamp_percent(self.percent.unwrap_or(0))
    }

    pub fn to_pending(&self) -> PendingMessage {
        PendingMessage {
            message_id: self.message_id,
            payload: self.payload.clone(),
            received_at: self.received_at,
        }
    }
}

/// A raw message held in the pending buffer until its task can be resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub message_id: Uuid,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl PendingMessage {
    /// Re-parse for replay, keeping the original correlation id and arrival time
    pub fn to_completion(&self) -> CompletionMessage {
        CompletionMessage {
            message_id: self.message_id,
            received_at: self.received_at,
            ..CompletionMessage::from_value(self.payload.clone())
        }
    }
}

fn identifier_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => {
            let id = id.trim();
            (!id.is_empty()).then(|| id.to_string())
        }
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn percent_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.floor() as i64))
        }
        _ => None,
    }
}
