//! # Reconciler Configuration
//!
//! Defaults cover a single-instance deployment. Values can be layered from an optional
//! configuration file (TOML, YAML or JSON, by extension) and then from `RANKWATCH_*`
//! environment variables, e.g. `RANKWATCH_PENDING_TTL_SECONDS=900`.

use crate::constants::{
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_FAILURE_MESSAGE, DEFAULT_MAX_CONCURRENT_MESSAGES,
    DEFAULT_MAX_SAVE_ATTEMPTS, DEFAULT_PENDING_TTL, DEFAULT_SWEEP_INTERVAL,
};
use crate::error::{ReconcilerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "RANKWATCH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Retention of unclaimed completion messages
    pub pending_ttl_seconds: u64,
    /// Concurrency bound for batch deliveries
    pub max_concurrent_messages: usize,
    /// Reconcile passes per message when saves hit version conflicts
    pub max_save_attempts: u32,
    /// Period of the expired-entry sweep
    pub sweep_interval_seconds: u64,
    pub event_channel_capacity: usize,
    /// Error text for failures reported without one
    pub default_failure_message: String,
    pub database_url: Option<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            pending_ttl_seconds: DEFAULT_PENDING_TTL.as_secs(),
            max_concurrent_messages: DEFAULT_MAX_CONCURRENT_MESSAGES,
            max_save_attempts: DEFAULT_MAX_SAVE_ATTEMPTS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL.as_secs(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            default_failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
            database_url: None,
        }
    }
}

impl ReconcilerConfig {
    /// Defaults overlaid with `RANKWATCH_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::load_with_prefix(None, ENV_PREFIX)
    }

    /// Defaults, then the file at `path` (if it exists), then the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_prefix(Some(path.as_ref()), ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading reconciler configuration file");
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix(prefix).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pending_ttl_seconds == 0 {
            return Err(ReconcilerError::Configuration(
                "pending_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_messages == 0 {
            return Err(ReconcilerError::Configuration(
                "max_concurrent_messages must be greater than zero".to_string(),
            ));
        }
        if self.max_save_attempts == 0 {
            return Err(ReconcilerError::Configuration(
                "max_save_attempts must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(ReconcilerError::Configuration(
                "sweep_interval_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}
