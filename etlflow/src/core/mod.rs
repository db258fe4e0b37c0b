//! Core domain model types for etlflow.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Raw partitions, observations and engineered rows
//! - Flat records and their cell values
//! - Versioned table schemas
//! - Pipeline state and stage status enums

mod row;
mod schema;
mod status;
pub mod timestamps;
mod value;

pub use row::{FetchStatus, Observation, RawPartition, Row, PARTITION_COLUMN, TIME_COLUMN};
pub use schema::{ColumnDef, ColumnKind, ColumnSource, TableSchema};
pub use status::{PipelineState, StageStatus};
pub use value::{FieldValue, Record};
