//! Event sink system for observability.
//!
//! Components report notable moments of a run (stage boundaries, retries,
//! failed batches) to an [`EventSink`] passed in by the caller. There is no
//! process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the pipeline.
pub mod names {
    /// A stage is about to run.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage returned.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage returned an error or panicked.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A partition fetch is about to be retried.
    pub const FETCH_RETRY: &str = "fetch.retry";
    /// A partition exhausted its attempts.
    pub const FETCH_FAILED: &str = "fetch.failed";
    /// A batch insert is about to be retried.
    pub const LOAD_RETRY: &str = "load.retry";
    /// A batch exhausted its attempts.
    pub const LOAD_BATCH_FAILED: &str = "load.batch_failed";
    /// The run stopped before loading.
    pub const PIPELINE_ABORTED: &str = "pipeline.aborted";
    /// The run reached its final state.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
}
