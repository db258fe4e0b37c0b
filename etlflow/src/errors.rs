//! Error types for the etlflow pipeline.
//!
//! Only configuration problems are fatal. Everything else is either retried
//! inside a component or folded into that component's result value, so most
//! callers only ever see [`ConfigError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for etlflow operations.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Invalid or missing configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The request never produced a response (connect failure, timeout, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote side answered with a non-success status.
    #[error("Remote returned status {status}: {message}")]
    RemoteStatus {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// A payload did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A required local input does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A required column or field was not present.
    #[error("{0}")]
    FieldAbsent(#[from] FieldAbsent),

    /// The run was cancelled or its deadline elapsed.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// A stage failed for a reason not covered above.
    #[error("Stage {stage} failed: {message}")]
    Stage {
        /// Stage name.
        stage: String,
        /// Failure detail.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EtlError {
    /// Creates a stage error.
    #[must_use]
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Transport failures, 5xx answers, 408 and 429 are transient. Decoding
    /// and configuration problems will fail the same way every time.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Io(_) => true,
            Self::RemoteStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Returns a short machine-readable category for logs and reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport(_) => "transport",
            Self::RemoteStatus { .. } => "remote_status",
            Self::Decode(_) => "decode",
            Self::NotFound(_) => "not_found",
            Self::FieldAbsent(_) => "field_absent",
            Self::Cancelled(_) => "cancelled",
            Self::Stage { .. } => "stage",
            Self::Serialization(_) => "serialization",
            Self::Csv(_) => "csv",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for EtlError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::RemoteStatus {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Error raised when the configuration cannot drive a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Configuration error: {key}: {message}")]
pub struct ConfigError {
    /// Dotted configuration key, e.g. `store.api_key`.
    pub key: String,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a required key that has no value.
    #[must_use]
    pub fn missing(key: impl Into<String>) -> Self {
        Self::new(key, "missing required value")
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        let key = err.path.join(".");
        Self::new(if key.is_empty() { "<root>".to_string() } else { key }, err.to_string())
    }
}

/// A declared column was not present in a record set or schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[error("Column not found: {column}")]
pub struct FieldAbsent {
    /// The missing column name.
    pub column: String,
}

impl FieldAbsent {
    /// Creates a new field-absent condition.
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

/// Convenience result alias.
pub type Result<T, E = EtlError> = std::result::Result<T, E>;
