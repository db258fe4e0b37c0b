//! # Etlflow
//!
//! A batch Extract → Transform → Load → Analyze pipeline for measurement data.
//!
//! Etlflow provides:
//!
//! - **Resilient extraction**: per-partition fetches with bounded retries,
//!   exponential backoff and verbatim raw archiving
//! - **Declarative features**: pure bucketing, scoring, classification and
//!   code rules with an explicit null policy per derived field
//! - **Batch loading**: order-preserving batches with fixed-delay retries and
//!   partial-failure accounting
//! - **Reconciliation and reports**: post-load checks against the remote table,
//!   KPI, distribution and trend tables exported as CSV
//! - **Orchestration**: a stage state machine that turns errors and panics into
//!   structured stage reports
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use etlflow::prelude::*;
//!
//! let config = PipelineConfig::load(None)?;
//! config.validate()?;
//! let source = Arc::new(HttpMeasurementSource::new(&config.source.base_url, &metrics, timeout)?);
//! let store = Arc::new(HttpTableStore::new(endpoint, api_key, timeout)?);
//!
//! let report = Pipeline::from_config(&config, source, store).run().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod analyze;
pub mod config;
pub mod core;
pub mod datasets;
pub mod errors;
pub mod events;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod testing;
pub mod transform;
pub mod validate;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::analyze::{analyze, AnalysisReport, AnalysisSpec, KpiReport};
    pub use crate::config::{PartitionConfig, PipelineConfig};
    pub use crate::core::{
        FieldValue, Observation, PipelineState, RawPartition, Record, Row, StageStatus,
        TableSchema,
    };
    pub use crate::datasets::{DatasetKind, DatasetProfile};
    pub use crate::errors::{ConfigError, EtlError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    #[cfg(feature = "http")]
    pub use crate::extract::HttpMeasurementSource;
    pub use crate::extract::{CsvFileSource, Fetcher, FsRawArchive, MeasurementSource};
    #[cfg(feature = "http")]
    pub use crate::load::HttpTableStore;
    pub use crate::load::{BatchLoader, LoadResult, RemoteStore};
    pub use crate::pipeline::{
        CancellationToken, Pipeline, RetryConfig, RetryOn, RunReport, StageReport,
    };
    pub use crate::transform::FeatureEngine;
    pub use crate::validate::{validate, ReconciliationReport, ValidationRules};
}
