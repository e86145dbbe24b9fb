use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate status of a tracking task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no job has reported yet
    #[default]
    Pending,
    /// At least one job is still running
    Processing,
    /// Every known job completed
    Completed,
    /// A job reported failure
    Failed,
}

impl TaskStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the aggregate state machine allows moving from `self` to `target`.
    ///
    /// `pending -> processing -> {completed, failed}`; `processing -> processing` is the
    /// common progress tick. Terminal states only allow staying where they are.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        match (self, target) {
            (from, to) if *from == to => true,
            (Self::Pending, _) => true,
            (Self::Processing, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Canonical per-engine status produced by the status normalizer.
///
/// `Other` carries unmapped vocabulary (lower-cased) so it stays visible in diagnostics;
/// it is never terminal and never changes a stored engine status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngineStatus {
    Processing,
    Completed,
    Failed,
    Other(String),
}

impl EngineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EngineStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Other(value),
        }
    }
}

impl From<EngineStatus> for String {
    fn from(status: EngineStatus) -> Self {
        match status {
            EngineStatus::Other(raw) => raw,
            canonical => canonical.as_str().to_string(),
        }
    }
}
