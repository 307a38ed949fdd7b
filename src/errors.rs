// src/errors.rs

//! Crate-wide error type and classification helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid definition: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid schedule \"{expression}\": {reason}")]
    Schedule { expression: String, reason: String },

    #[error("Failed to create unit '{name}': {reason}")]
    UnitCreate { name: String, reason: String },

    #[error("Failed to delete unit '{name}': {reason}")]
    UnitDelete { name: String, reason: String },

    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("Log stream unavailable for unit '{name}': {reason}")]
    Logs { name: String, reason: String },

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("No channel group registered for run '{0}'")]
    ChannelGroupMissing(String),

    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of an error, as reported to control-plane callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request was malformed; nothing was changed.
    Validation,
    /// The request collides with existing state.
    Conflict,
    /// The referenced object does not exist.
    NotFound,
    /// Anything else.
    Internal,
}

impl PodflowError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PodflowError::Validation(_) | PodflowError::Schedule { .. } => ErrorClass::Validation,
            PodflowError::Conflict(_) => ErrorClass::Conflict,
            PodflowError::UnitNotFound(_) | PodflowError::WorkloadNotFound(_) => {
                ErrorClass::NotFound
            }
            _ => ErrorClass::Internal,
        }
    }

    /// Whether this error means the remote unit is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PodflowError::UnitNotFound(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PodflowError>;
