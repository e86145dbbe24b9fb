//! # Engine State
//!
//! Last-known progress of a single external job inside a task.

use crate::constants::MAX_PERCENT;
use crate::state_machine::EngineStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Clamp a reported percentage into `0..=100`
pub fn clamp_percent(raw: i64) -> u8 {
    raw.clamp(0, i64::from(MAX_PERCENT)) as u8
}

/// Stored `{percent, status}` for one job id.
///
/// `status` only ever holds `processing`, `completed` or `failed`. `last_reported` keeps the
/// most recent normalized status text verbatim, including vocabulary the engine does not map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub percent: u8,
    pub status: EngineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reported: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            percent: 0,
            status: EngineStatus::Processing,
            last_reported: None,
            updated_at: None,
        }
    }
}

impl EngineState {
    pub fn is_completed(&self) -> bool {
        self.status == EngineStatus::Completed
    }
}

/// Per-job engine states of a task, keyed by external job id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineStates(BTreeMap<String, EngineState>);

impl EngineStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<&EngineState> {
        self.0.get(job_id)
    }

    /// Entry for `job_id`, created as `{0, processing}` on first sighting
    pub fn entry_or_default(&mut self, job_id: &str) -> &mut EngineState {
        self.0.entry(job_id.to_string()).or_default()
    }

    pub fn insert(&mut self, job_id: impl Into<String>, state: EngineState) {
        self.0.insert(job_id.into(), state);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EngineState)> {
        self.0.iter().map(|(id, state)| (id.as_str(), state))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
