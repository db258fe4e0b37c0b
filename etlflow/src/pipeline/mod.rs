//! Pipeline orchestration and resilience primitives.
//!
//! This module provides:
//! - The Extract → Transform → Load → Analyze state machine
//! - Retry with backoff and jitter
//! - Run-level cancellation with an optional deadline

mod cancellation;
mod orchestrator;
mod retry;


pub use cancellation::CancellationToken;
pub use orchestrator::{PartitionSummary, Pipeline, RunReport, StageReport};
pub use retry::{retry_with, BackoffStrategy, JitterStrategy, RetryConfig, RetryOn, RetryOutcome};
