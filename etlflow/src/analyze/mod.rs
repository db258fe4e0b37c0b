//! KPI, distribution and trend reports over the engineered set.

mod report;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use chrono::Timelike;

use crate::core::timestamps::parse_timestamp_lenient;
use crate::core::{FieldValue, Record, TIME_COLUMN};

pub use report::{
    AnalysisReport, DistributionRow, KpiReport, DISTRIBUTION_FILE, SUMMARY_FILE, TRENDS_FILE,
};

/// Group with the highest mean of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopMean {
    /// KPI name. The value is reported as `<kpi>_value`.
    pub kpi: String,
    /// Metric averaged per group.
    pub metric: String,
}

impl TopMean {
    /// Creates a top-mean KPI.
    #[must_use]
    pub fn new(kpi: &str, metric: &str) -> Self {
        Self {
            kpi: kpi.to_string(),
            metric: metric.to_string(),
        }
    }
}

/// Percentage of rows per label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelShares {
    /// Labelled field.
    pub field: String,
    /// Labels reported, each as `pct_<label>`.
    pub labels: Vec<String>,
}

/// Hour of day with the highest mean of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakHour {
    /// KPI name. The value is reported as `<kpi>_value`.
    pub kpi: String,
    /// Metric averaged per hour.
    pub metric: String,
}

/// Report layout for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSpec {
    /// Column rows are grouped by.
    pub group_column: String,
    /// Top-mean KPIs.
    pub top_means: Vec<TopMean>,
    /// Label percentage KPIs.
    pub label_shares: Option<LabelShares>,
    /// Peak hour KPI.
    pub peak_hour: Option<PeakHour>,
    /// Labelled field of the distribution table.
    pub distribution: Option<String>,
    /// Metrics of the trends table. Empty means no trends table.
    pub trend_metrics: Vec<String>,
}

impl AnalysisSpec {
    /// Creates an empty layout grouping by `group_column`.
    #[must_use]
    pub fn new(group_column: &str) -> Self {
        Self {
            group_column: group_column.to_string(),
            top_means: Vec::new(),
            label_shares: None,
            peak_hour: None,
            distribution: None,
            trend_metrics: Vec::new(),
        }
    }

    /// Adds a top-mean KPI.
    #[must_use]
    pub fn top_mean(mut self, kpi: TopMean) -> Self {
        self.top_means.push(kpi);
        self
    }

    /// Reports label percentages of a field.
    #[must_use]
    pub fn label_shares(mut self, field: &str, labels: &[&str]) -> Self {
        self.label_shares = Some(LabelShares {
            field: field.to_string(),
            labels: labels.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Reports the peak hour of a metric.
    #[must_use]
    pub fn peak_hour(mut self, kpi: &str, metric: &str) -> Self {
        self.peak_hour = Some(PeakHour {
            kpi: kpi.to_string(),
            metric: metric.to_string(),
        });
        self
    }

    /// Adds a group × label distribution table.
    #[must_use]
    pub fn distribution(mut self, field: &str) -> Self {
        self.distribution = Some(field.to_string());
        self
    }

    /// Adds a trends table with these metrics.
    #[must_use]
    pub fn trends(mut self, metrics: &[&str]) -> Self {
        self.trend_metrics = metrics.iter().map(ToString::to_string).collect();
        self
    }

    /// Returns true if the layout produces nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top_means.is_empty()
            && self.label_shares.is_none()
            && self.peak_hour.is_none()
            && self.distribution.is_none()
            && self.trend_metrics.is_empty()
    }
}

/// KPI name for a label share: `pct_` plus the label lowercased with spaces
/// replaced by `_`.
#[must_use]
pub fn share_name(label: &str) -> String {
    format!("pct_{}", label.to_lowercase().replace(' ', "_"))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Key of the largest mean. Ties go to the first key in order.
fn arg_max<K: Clone + Ord>(groups: &BTreeMap<K, Vec<f64>>) -> Option<(K, f64)> {
    groups
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(k, values)| (k.clone(), mean(values)))
        .fold(None, |best: Option<(K, f64)>, (k, m)| match best {
            Some((_, bm)) if bm >= m => best,
            _ => Some((k, m)),
        })
}

fn text(record: &Record, column: &str) -> Option<String> {
    record.get(column).and_then(FieldValue::as_text)
}

fn number(record: &Record, column: &str) -> Option<f64> {
    record.get(column).and_then(FieldValue::as_f64)
}

fn kpis(spec: &AnalysisSpec, records: &[Record]) -> KpiReport {
    let mut report = KpiReport::default();

    for top in &spec.top_means {
        let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for record in records {
            let group = text(record, &spec.group_column);
            if let (Some(group), Some(value)) = (group, number(record, &top.metric)) {
                groups.entry(group).or_default().push(value);
            }
        }
        let best = arg_max(&groups);
        report.push(
            top.kpi.clone(),
            FieldValue::from_opt_text(best.as_ref().map(|(g, _)| g.as_str())),
        );
        report.push(format!("{}_value", top.kpi), FieldValue::from_opt_f64(best.map(|(_, m)| m)));
    }

    if let Some(shares) = &spec.label_shares {
        let total = records.len();
        for label in &shares.labels {
            let count = records
                .iter()
                .filter(|r| text(r, &shares.field).as_deref() == Some(label.as_str()))
                .count();
            let pct = (total > 0).then(|| count as f64 / total as f64 * 100.0);
            report.push(share_name(label), FieldValue::from_opt_f64(pct));
        }
    }

    if let Some(peak) = &spec.peak_hour {
        let mut hours: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for record in records {
            let hour = text(record, TIME_COLUMN)
                .and_then(|t| parse_timestamp_lenient(&t))
                .map(|ts| i64::from(ts.hour()));
            if let (Some(hour), Some(value)) = (hour, number(record, &peak.metric)) {
                hours.entry(hour).or_default().push(value);
            }
        }
        let best = arg_max(&hours);
        report.push(peak.kpi.clone(), best.map_or(FieldValue::Null, |(h, _)| FieldValue::Int(h)));
        report.push(format!("{}_value", peak.kpi), FieldValue::from_opt_f64(best.map(|(_, m)| m)));
    }

    report
}

fn distribution(group_column: &str, field: &str, records: &[Record]) -> Vec<DistributionRow> {
    let mut totals: BTreeMap<String, usize> = BTreeMap::new();
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for record in records {
        let Some(group) = text(record, group_column) else {
            continue;
        };
        *totals.entry(group.clone()).or_default() += 1;
        if let Some(label) = text(record, field) {
            *counts.entry((group, label)).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|((group, label), count)| {
            let total = totals.get(&group).copied().unwrap_or(count);
            DistributionRow {
                percent: count as f64 / total as f64 * 100.0,
                group,
                label,
                count,
                total,
            }
        })
        .collect()
}

fn trends(
    group_column: &str,
    metrics: &[String],
    records: &[Record],
) -> (Vec<String>, Vec<Record>) {
    let columns: Vec<String> = [group_column.to_string(), TIME_COLUMN.to_string()]
        .into_iter()
        .chain(metrics.iter().cloned())
        .collect();
    let mut rows: Vec<Record> = records
        .iter()
        .filter(|r| r.get(TIME_COLUMN).is_some_and(|t| !t.is_null()))
        .map(|r| {
            columns
                .iter()
                .map(|c| (c.clone(), r.get(c).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();
    rows.sort_by(|a, b| {
        let key = |r: &Record| (text(r, group_column), text(r, TIME_COLUMN));
        key(a).cmp(&key(b))
    });
    (columns, rows)
}

/// Computes the report tables for a flat record set.
///
/// Pure: the same records always give the same report.
#[must_use]
pub fn analyze(spec: &AnalysisSpec, records: &[Record]) -> AnalysisReport {
    let (trend_columns, trend_rows) = if spec.trend_metrics.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        trends(&spec.group_column, &spec.trend_metrics, records)
    };

    AnalysisReport {
        kpis: kpis(spec, records),
        group_column: spec.group_column.clone(),
        label_column: spec.distribution.clone(),
        distribution: spec
            .distribution
            .as_deref()
            .map(|field| distribution(&spec.group_column, field, records))
            .unwrap_or_default(),
        trend_columns,
        trends: trend_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec() -> AnalysisSpec {
        AnalysisSpec::new("city")
            .top_mean(TopMean::new("city_highest_avg_pm2_5", "pm2_5"))
            .label_shares("risk_flag", &["High Risk", "Moderate Risk", "Low Risk"])
            .peak_hour("hour_of_day_worst_aqi", "pm2_5")
            .distribution("risk_flag")
            .trends(&["pm2_5"])
    }

    fn reading(city: &str, time: Option<&str>, pm2_5: Option<f64>, risk: Option<&str>) -> Record {
        Record::from([
            ("city".to_string(), FieldValue::from(city)),
            ("time".to_string(), FieldValue::from_opt_text(time)),
            ("pm2_5".to_string(), FieldValue::from_opt_f64(pm2_5)),
            ("risk_flag".to_string(), FieldValue::from_opt_text(risk)),
        ])
    }

    fn sample() -> Vec<Record> {
        vec![
            reading("Mumbai", Some("2024-05-01T02:00:00"), Some(10.0), Some("Low Risk")),
            reading("Delhi", Some("2024-05-01T01:00:00"), Some(90.0), Some("High Risk")),
            reading("Delhi", Some("2024-05-01T00:00:00"), Some(30.0), None),
            reading("Mumbai", None, Some(20.0), Some("Moderate Risk")),
        ]
    }

    #[test]
    fn test_kpis() {
        let report = analyze(&spec(), &sample());
        let kpis = &report.kpis;

        assert_eq!(kpis.get("city_highest_avg_pm2_5"), Some(&FieldValue::Text("Delhi".into())));
        assert_eq!(kpis.get("city_highest_avg_pm2_5_value"), Some(&FieldValue::Float(60.0)));
        assert_eq!(kpis.get("pct_high_risk"), Some(&FieldValue::Float(25.0)));
        assert_eq!(kpis.get("pct_moderate_risk"), Some(&FieldValue::Float(25.0)));
        assert_eq!(kpis.get("pct_low_risk"), Some(&FieldValue::Float(25.0)));
        assert_eq!(kpis.get("hour_of_day_worst_aqi"), Some(&FieldValue::Int(1)));
        assert_eq!(kpis.get("hour_of_day_worst_aqi_value"), Some(&FieldValue::Float(90.0)));
    }

    #[test]
    fn test_empty_input_gives_null_kpis() {
        let report = analyze(&spec(), &[]);
        assert!(report.kpis.values.iter().all(|(_, v)| v.is_null()));
        assert!(report.distribution.is_empty());
        assert!(report.trends.is_empty());
    }

    #[test]
    fn test_distribution_counts_null_labels_in_total() {
        let report = analyze(&spec(), &sample());
        let delhi: Vec<&DistributionRow> = report
            .distribution
            .iter()
            .filter(|r| r.group == "Delhi")
            .collect();

        assert_eq!(delhi.len(), 1);
        assert_eq!(delhi[0].label, "High Risk");
        assert_eq!(delhi[0].count, 1);
        assert_eq!(delhi[0].total, 2);
        assert!((delhi[0].percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_trends_sorted_and_null_time_dropped() {
        let report = analyze(&spec(), &sample());
        assert_eq!(report.trend_columns, vec!["city", "time", "pm2_5"]);
        let order: Vec<(String, String)> = report
            .trends
            .iter()
            .map(|r| (r["city"].to_string(), r["time"].to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Delhi".to_string(), "2024-05-01T00:00:00".to_string()),
                ("Delhi".to_string(), "2024-05-01T01:00:00".to_string()),
                ("Mumbai".to_string(), "2024-05-01T02:00:00".to_string()),
            ]
        );
    }

    #[test]
    fn test_share_name() {
        assert_eq!(share_name("Moderate Risk"), "pct_moderate_risk");
    }

    #[test]
    fn test_export_writes_three_tables() {
        let dir = tempfile::tempdir().unwrap();
        let report = analyze(&spec(), &sample());
        let written = report.export(dir.path()).unwrap();

        assert_eq!(written.len(), 3);
        let summary = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
        let header = "city_highest_avg_pm2_5,city_highest_avg_pm2_5_value,pct_high_risk";
        assert!(summary.starts_with(header));
        let dist = std::fs::read_to_string(dir.path().join(DISTRIBUTION_FILE)).unwrap();
        assert!(dist.starts_with("city,risk_flag,count,total,percent\nDelhi,High Risk,1,2,50\n"));
        let trends = std::fs::read_to_string(dir.path().join(TRENDS_FILE)).unwrap();
        assert_eq!(trends.lines().count(), 4);
    }

    #[test]
    fn test_empty_spec_exports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let spec = AnalysisSpec::new("contract");
        assert!(spec.is_empty());
        assert!(analyze(&spec, &sample()).export(dir.path()).unwrap().is_empty());
    }
}
