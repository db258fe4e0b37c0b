//! Analysis report tables and their CSV export.

use csv::Writer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{FieldValue, Record};
use crate::errors::EtlError;

/// File name of the KPI table.
pub const SUMMARY_FILE: &str = "summary_metrics.csv";
/// File name of the label distribution table.
pub const DISTRIBUTION_FILE: &str = "city_risk_distribution.csv";
/// File name of the trends table.
pub const TRENDS_FILE: &str = "pollution_trends.csv";

/// Single row of named KPI values, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiReport {
    /// Name and value pairs.
    pub values: Vec<(String, FieldValue)>,
}

impl KpiReport {
    /// Appends a KPI.
    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.push((name.into(), value));
    }

    /// Looks a KPI up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns true if no KPI was computed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One group × label cell of the distribution table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    /// Group value, e.g. the city.
    pub group: String,
    /// Label value.
    pub label: String,
    /// Rows of the group carrying the label.
    pub count: usize,
    /// Rows of the group, null labels included.
    pub total: usize,
    /// `count / total * 100`.
    pub percent: f64,
}

/// Everything the Analyze stage produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// KPI row.
    pub kpis: KpiReport,
    /// Name of the grouping column.
    pub group_column: String,
    /// Name of the labelled column of the distribution, if any.
    pub label_column: Option<String>,
    /// Distribution table, sorted by group then label.
    pub distribution: Vec<DistributionRow>,
    /// Column order of the trends table.
    pub trend_columns: Vec<String>,
    /// Trends table, sorted by group then time.
    pub trends: Vec<Record>,
}

impl AnalysisReport {
    /// Writes every non-empty table into `dir`. Returns the written paths.
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>, EtlError> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        if !self.kpis.is_empty() {
            let path = dir.join(SUMMARY_FILE);
            let mut writer = Writer::from_path(&path)?;
            writer.write_record(self.kpis.values.iter().map(|(name, _)| name.as_str()))?;
            writer.write_record(self.kpis.values.iter().map(|(_, value)| value.to_string()))?;
            writer.flush()?;
            written.push(path);
        }

        if let Some(label_column) = &self.label_column {
            let path = dir.join(DISTRIBUTION_FILE);
            let mut writer = Writer::from_path(&path)?;
            writer.write_record([
                self.group_column.as_str(),
                label_column.as_str(),
                "count",
                "total",
                "percent",
            ])?;
            for row in &self.distribution {
                writer.write_record([
                    row.group.clone(),
                    row.label.clone(),
                    row.count.to_string(),
                    row.total.to_string(),
                    row.percent.to_string(),
                ])?;
            }
            writer.flush()?;
            written.push(path);
        }

        if !self.trend_columns.is_empty() {
            let path = dir.join(TRENDS_FILE);
            let mut writer = Writer::from_path(&path)?;
            writer.write_record(&self.trend_columns)?;
            for record in &self.trends {
                writer.write_record(
                    self.trend_columns
                        .iter()
                        .map(|c| record.get(c).map(ToString::to_string).unwrap_or_default()),
                )?;
            }
            writer.flush()?;
            written.push(path);
        }

        for path in &written {
            tracing::info!(path = %path.display(), "Saved report table");
        }
        Ok(written)
    }
}
