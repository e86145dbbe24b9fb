//! Error types for the reconciliation engine.

use crate::cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    /// The stored task changed since it was read
    #[error("Version conflict: {0}")]
    VersionConflict(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("State transition error: {0}")]
    StateTransition(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ReconcilerError {
    fn from(error: serde_json::Error) -> Self {
        ReconcilerError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<sqlx::Error> for ReconcilerError {
    fn from(err: sqlx::Error) -> Self {
        ReconcilerError::Persistence(err.to_string())
    }
}

impl From<::config::ConfigError> for ReconcilerError {
    fn from(err: ::config::ConfigError) -> Self {
        ReconcilerError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
