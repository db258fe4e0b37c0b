//! Pipeline state and stage status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The states of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Pulling raw partitions from the source.
    Extract,
    /// Turning raw partitions into engineered rows.
    Transform,
    /// Writing engineered rows to the remote store.
    Load,
    /// Reconciling and reporting on the loaded data.
    Analyze,
    /// The run finished every stage.
    Done,
    /// The run stopped early.
    Aborted,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Extract
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extract => write!(f, "extract"),
            Self::Transform => write!(f, "transform"),
            Self::Load => write!(f, "load"),
            Self::Analyze => write!(f, "analyze"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl PipelineState {
    /// Returns true if no further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Returns the state that follows a successful stage, ignoring guards.
    #[must_use]
    pub fn next(&self) -> Self {
        match self {
            Self::Extract => Self::Transform,
            Self::Transform => Self::Load,
            Self::Load => Self::Analyze,
            Self::Analyze | Self::Done => Self::Done,
            Self::Aborted => Self::Aborted,
        }
    }
}

/// The outcome of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed with every unit succeeding.
    Ok,
    /// Stage completed but some units failed.
    Partial,
    /// Stage was not run.
    Skip,
    /// Stage failed.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Partial => write!(f, "partial"),
            Self::Skip => write!(f, "skip"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the stage produced usable output.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Partial)
    }
}
