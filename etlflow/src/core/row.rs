//! Raw partitions and engineered rows.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::timestamps::format_timestamp;
use super::value::FieldValue;

/// Name of the partition key column in flat records.
pub const PARTITION_COLUMN: &str = "partition";
/// Name of the timestamp column in flat records.
pub const TIME_COLUMN: &str = "time";

/// One observation inside a raw partition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    /// Observation time, if the source provided a parseable one.
    pub timestamp: Option<NaiveDateTime>,
    /// Numeric metrics by name. `None` marks a null reading.
    #[serde(default)]
    pub metrics: BTreeMap<String, Option<f64>>,
    /// Text attributes by name.
    #[serde(default)]
    pub attributes: BTreeMap<String, Option<String>>,
}

impl Observation {
    /// Creates an empty observation at the given time.
    #[must_use]
    pub fn at(timestamp: Option<NaiveDateTime>) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// Adds a metric reading.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Adds a text attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.attributes.insert(name.into(), value.map(str::to_string));
        self
    }
}

/// Outcome of fetching one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    /// The payload was fetched and decoded.
    Succeeded {
        /// Where the raw payload was archived, if archiving worked.
        archive_path: Option<PathBuf>,
    },
    /// Every attempt failed.
    Failed {
        /// The last error seen.
        error: String,
    },
}

/// One independently fetched unit of source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPartition {
    /// Partition key, e.g. a city name.
    pub key: String,
    /// When the final attempt finished.
    pub fetched_at: DateTime<Utc>,
    /// Number of attempts made.
    pub attempts: usize,
    /// Fetch outcome.
    pub status: FetchStatus,
    /// Decoded observations, in source order. Empty on failure.
    pub observations: Vec<Observation>,
}

impl RawPartition {
    /// Creates a successful partition.
    #[must_use]
    pub fn succeeded(
        key: impl Into<String>,
        observations: Vec<Observation>,
        archive_path: Option<PathBuf>,
        attempts: usize,
    ) -> Self {
        Self {
            key: key.into(),
            fetched_at: Utc::now(),
            attempts,
            status: FetchStatus::Succeeded { archive_path },
            observations,
        }
    }

    /// Creates a failed partition.
    #[must_use]
    pub fn failed(key: impl Into<String>, error: impl Into<String>, attempts: usize) -> Self {
        Self {
            key: key.into(),
            fetched_at: Utc::now(),
            attempts,
            status: FetchStatus::Failed {
                error: error.into(),
            },
            observations: Vec::new(),
        }
    }

    /// Returns true if the fetch succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Succeeded { .. })
    }

    /// Returns the last error for failed partitions.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            FetchStatus::Failed { error } => Some(error),
            FetchStatus::Succeeded { .. } => None,
        }
    }

    /// Returns the archive path for successful partitions.
    #[must_use]
    pub fn archive_path(&self) -> Option<&PathBuf> {
        match &self.status {
            FetchStatus::Succeeded { archive_path } => archive_path.as_ref(),
            FetchStatus::Failed { .. } => None,
        }
    }
}

/// One engineered record.
///
/// Source fields live in `metrics` and `attributes`; everything the feature
/// engine computes lives in `derived`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    /// Partition key the row came from.
    pub partition: String,
    /// Observation time.
    pub timestamp: Option<NaiveDateTime>,
    /// Numeric source fields.
    pub metrics: BTreeMap<String, Option<f64>>,
    /// Text source fields.
    pub attributes: BTreeMap<String, Option<String>>,
    /// Derived fields.
    pub derived: BTreeMap<String, FieldValue>,
}

impl Row {
    /// Creates a row from a raw observation.
    #[must_use]
    pub fn from_observation(partition: impl Into<String>, observation: &Observation) -> Self {
        Self {
            partition: partition.into(),
            timestamp: observation.timestamp,
            metrics: observation.metrics.clone(),
            attributes: observation.attributes.clone(),
            derived: BTreeMap::new(),
        }
    }

    /// Returns a metric value. Absent and null both read as `None`.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }

    /// Returns a text attribute. Absent and null both read as `None`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.as_deref())
    }

    /// Returns a derived value, or null if it was never computed.
    #[must_use]
    pub fn derived(&self, name: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.derived.get(name).unwrap_or(&NULL)
    }

    /// Sets a derived value.
    pub fn set_derived(&mut self, name: impl Into<String>, value: FieldValue) {
        self.derived.insert(name.into(), value);
    }

    /// Numeric value of a metric or numeric derived field.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .copied()
            .flatten()
            .or_else(|| self.derived.get(name).and_then(FieldValue::as_f64))
    }

    /// Looks a column up by name across every section of the row.
    ///
    /// Returns `None` when the row has no such column at all, which is
    /// different from a column holding null.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            PARTITION_COLUMN => return Some(FieldValue::Text(self.partition.clone())),
            TIME_COLUMN => {
                return Some(
                    self.timestamp
                        .as_ref()
                        .map_or(FieldValue::Null, |ts| FieldValue::Text(format_timestamp(ts))),
                )
            }
            _ => {}
        }
        if let Some(v) = self.derived.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.metrics.get(name) {
            return Some(FieldValue::from_opt_f64(*v));
        }
        self.attributes
            .get(name)
            .map(|v| FieldValue::from_opt_text(v.as_deref()))
    }
}
