//! Reconciliation findings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::errors::FieldAbsent;

/// One reconciliation check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Finding {
    /// Null count of a critical field in the remote set.
    NullCount {
        /// Field checked.
        field: String,
        /// Rows holding null.
        nulls: usize,
    },
    /// Staged versus remote row counts.
    RowCount {
        /// Rows in the staged artifact.
        staged: usize,
        /// Rows in the remote table.
        remote: usize,
    },
    /// Category labels expected but never observed.
    CategoryCoverage {
        /// Field checked.
        field: String,
        /// Distinct labels seen.
        observed: BTreeSet<String>,
        /// Expected labels not seen.
        missing: BTreeSet<String>,
    },
    /// Codes observed outside the valid domain.
    CodeDomain {
        /// Field checked.
        field: String,
        /// Distinct codes seen.
        observed: BTreeSet<i64>,
        /// Codes outside the domain.
        invalid: BTreeSet<i64>,
    },
    /// A checked column is absent from the remote set.
    ColumnNotFound(FieldAbsent),
}

impl Finding {
    /// Returns true if this finding signals a discrepancy.
    #[must_use]
    pub fn is_problem(&self) -> bool {
        match self {
            Self::NullCount { nulls, .. } => *nulls > 0,
            Self::RowCount { staged, remote } => staged != remote,
            Self::CategoryCoverage { missing, .. } => !missing.is_empty(),
            Self::CodeDomain { invalid, .. } => !invalid.is_empty(),
            Self::ColumnNotFound(_) => true,
        }
    }
}

fn join<T: fmt::Display>(items: &BTreeSet<T>) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullCount { field, nulls } => write!(f, "{field}: {nulls} null values"),
            Self::RowCount { staged, remote } if staged == remote => {
                write!(f, "row count: {staged} == {remote}")
            }
            Self::RowCount { staged, remote } => write!(f, "row count: {staged} != {remote}"),
            Self::CategoryCoverage { field, observed, missing } => write!(
                f,
                "{field}: observed [{}], missing [{}]",
                join(observed),
                join(missing)
            ),
            Self::CodeDomain { field, observed, invalid } => write!(
                f,
                "{field}: observed [{}], invalid [{}]",
                join(observed),
                join(invalid)
            ),
            Self::ColumnNotFound(absent) => write!(f, "{absent}"),
        }
    }
}

/// Every finding of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Findings in check order.
    pub findings: Vec<Finding>,
}

impl ReconciliationReport {
    /// Findings that signal a discrepancy.
    pub fn problems(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_problem())
    }

    /// Returns true if no finding signals a discrepancy.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.problems().next().is_none()
    }

    /// The row-count finding, if the check ran.
    #[must_use]
    pub fn row_count(&self) -> Option<&Finding> {
        self.findings
            .iter()
            .find(|f| matches!(f, Finding::RowCount { .. }))
    }

    /// Columns reported absent.
    #[must_use]
    pub fn absent_columns(&self) -> Vec<&str> {
        self.findings
            .iter()
            .filter_map(|f| match f {
                Finding::ColumnNotFound(absent) => Some(absent.column.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, finding) in self.findings.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let mark = if finding.is_problem() { "!" } else { "ok" };
            write!(f, "[{mark}] {finding}")?;
        }
        Ok(())
    }
}
