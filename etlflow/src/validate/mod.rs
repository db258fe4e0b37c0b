//! Post-load reconciliation of the staged set against the remote table.
//!
//! Every check runs independently; a failed or inapplicable check never
//! stops the others. Discrepancies are findings, not errors.

mod report;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::Record;
use crate::errors::FieldAbsent;

pub use report::{Finding, ReconciliationReport};

/// Expected labels for a categorical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Field checked.
    pub field: String,
    /// Labels that should all appear.
    pub expected: BTreeSet<String>,
}

/// Valid codes for a coded field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRule {
    /// Field checked.
    pub field: String,
    /// Codes allowed.
    pub valid: BTreeSet<i64>,
}

/// Declared reconciliation checks for a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Critical numeric fields whose nulls are counted.
    pub null_checks: Vec<String>,
    /// Category coverage checks.
    pub categories: Vec<CategoryRule>,
    /// Code domain checks.
    pub codes: Vec<CodeRule>,
}

impl ValidationRules {
    /// Creates an empty rule set. Row counts are always compared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts nulls of a field.
    #[must_use]
    pub fn null_check(mut self, field: &str) -> Self {
        self.null_checks.push(field.to_string());
        self
    }

    /// Expects every label to appear in a field.
    #[must_use]
    pub fn expect_categories(mut self, field: &str, labels: &[&str]) -> Self {
        self.categories.push(CategoryRule {
            field: field.to_string(),
            expected: labels.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Restricts a field to a set of codes.
    #[must_use]
    pub fn code_domain(mut self, field: &str, codes: &[i64]) -> Self {
        self.codes.push(CodeRule {
            field: field.to_string(),
            valid: codes.iter().copied().collect(),
        });
        self
    }
}

/// Reconciles a staged record set against the remote one.
///
/// Column names are compared lowercase. A column no remote record carries is
/// reported as [`Finding::ColumnNotFound`].
#[must_use]
pub fn validate(
    rules: &ValidationRules,
    staged: &[Record],
    remote: &[Record],
) -> ReconciliationReport {
    let remote: Vec<Record> = remote
        .iter()
        .map(|r| r.iter().map(|(k, v)| (k.trim().to_lowercase(), v.clone())).collect())
        .collect();
    let columns: BTreeSet<&str> = remote
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();
    let mut findings = Vec::new();

    for field in &rules.null_checks {
        let field = field.to_lowercase();
        if columns.contains(field.as_str()) {
            let nulls = remote
                .iter()
                .filter(|r| r.get(&field).map_or(true, |v| v.is_null()))
                .count();
            findings.push(Finding::NullCount { field, nulls });
        } else {
            findings.push(Finding::ColumnNotFound(FieldAbsent::new(field)));
        }
    }

    findings.push(Finding::RowCount {
        staged: staged.len(),
        remote: remote.len(),
    });

    for rule in &rules.categories {
        let field = rule.field.to_lowercase();
        if !columns.contains(field.as_str()) {
            findings.push(Finding::ColumnNotFound(FieldAbsent::new(field)));
            continue;
        }
        let observed: BTreeSet<String> = remote
            .iter()
            .filter_map(|r| r.get(&field).and_then(|v| v.as_text()))
            .collect();
        let missing = rule.expected.difference(&observed).cloned().collect();
        findings.push(Finding::CategoryCoverage { field, observed, missing });
    }

    for rule in &rules.codes {
        let field = rule.field.to_lowercase();
        if !columns.contains(field.as_str()) {
            findings.push(Finding::ColumnNotFound(FieldAbsent::new(field)));
            continue;
        }
        let observed: BTreeSet<i64> = remote
            .iter()
            .filter_map(|r| r.get(&field).and_then(|v| v.as_i64()))
            .collect();
        let invalid = observed.difference(&rule.valid).copied().collect();
        findings.push(Finding::CodeDomain { field, observed, invalid });
    }

    let report = ReconciliationReport { findings };
    for finding in report.problems() {
        tracing::warn!(finding = %finding, "Reconciliation discrepancy");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FieldValue;
    use pretty_assertions::assert_eq;

    fn churn_rules() -> ValidationRules {
        ValidationRules::new()
            .null_check("tenure")
            .null_check("MonthlyCharges")
            .expect_categories("tenure_group", &["New", "Regular", "Loyal", "Champion"])
            .code_domain("contract_type_code", &[0, 1, 2])
    }

    fn record(tenure: Option<i64>, group: &str, code: i64) -> Record {
        Record::from([
            ("tenure".to_string(), tenure.map_or(FieldValue::Null, FieldValue::Int)),
            ("monthlycharges".to_string(), FieldValue::Float(20.0)),
            ("tenure_group".to_string(), FieldValue::from(group)),
            ("contract_type_code".to_string(), FieldValue::Int(code)),
        ])
    }

    #[test]
    fn test_row_count_mismatch_is_a_finding() {
        let staged: Vec<Record> = (0..100).map(|_| record(Some(5), "New", 0)).collect();
        let remote: Vec<Record> = (0..98).map(|_| record(Some(5), "New", 0)).collect();

        let report = validate(&ValidationRules::new(), &staged, &remote);

        let row_count = report.row_count().unwrap();
        assert_eq!(row_count, &Finding::RowCount { staged: 100, remote: 98 });
        assert!(row_count.to_string().contains("100 != 98"));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_all_checks_run_independently() {
        let staged = vec![record(Some(1), "New", 0); 3];
        let remote = vec![
            record(None, "New", 0),
            record(Some(40), "Loyal", 1),
            record(Some(70), "Champion", 7),
        ];

        let report = validate(&churn_rules(), &staged, &remote);

        assert_eq!(
            report.findings,
            vec![
                Finding::NullCount { field: "tenure".into(), nulls: 1 },
                Finding::NullCount { field: "monthlycharges".into(), nulls: 0 },
                Finding::RowCount { staged: 3, remote: 3 },
                Finding::CategoryCoverage {
                    field: "tenure_group".into(),
                    observed: ["Champion", "Loyal", "New"]
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                    missing: ["Regular".to_string()].into_iter().collect(),
                },
                Finding::CodeDomain {
                    field: "contract_type_code".into(),
                    observed: [0, 1, 7].into_iter().collect(),
                    invalid: [7].into_iter().collect(),
                },
            ]
        );
        assert_eq!(report.problems().count(), 3);
    }

    #[test]
    fn test_absent_columns_are_distinct_findings() {
        let remote = vec![Record::from([("TENURE".to_string(), FieldValue::Int(3))])];
        let report = validate(&churn_rules(), &remote, &remote);

        assert_eq!(
            report.absent_columns(),
            vec!["monthlycharges", "tenure_group", "contract_type_code"]
        );
        assert_eq!(
            report.findings[0],
            Finding::NullCount { field: "tenure".into(), nulls: 0 }
        );
        assert!(report.to_string().contains("Column not found: tenure_group"));
    }

    #[test]
    fn test_clean_report() {
        let rows = vec![
            record(Some(1), "New", 0),
            record(Some(20), "Regular", 1),
            record(Some(40), "Loyal", 2),
            record(Some(70), "Champion", 2),
        ];
        let report = validate(&churn_rules(), &rows, &rows);
        assert!(report.is_clean());
        assert!(report.to_string().contains("row count: 4 == 4"));
    }
}
