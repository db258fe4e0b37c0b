//! Declarative feature rules.
//!
//! Each rule reads fields from one row and writes one derived field. Rules
//! never fail: a missing input yields a null output unless the rule's null
//! policy says otherwise. Dataset-level steps (row filtering, imputation) run
//! before the row rules and depend only on the multiset of rows, never on
//! their order.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::core::{FieldValue, RawPartition, Row};

/// One end of a band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// No limit on this side.
    Unbounded,
    /// The edge value belongs to the band.
    Inclusive(f64),
    /// The edge value does not belong to the band.
    Exclusive(f64),
}

impl Bound {
    fn admits_from_below(&self, value: f64) -> bool {
        match *self {
            Self::Unbounded => true,
            Self::Inclusive(edge) => value >= edge,
            Self::Exclusive(edge) => value > edge,
        }
    }

    fn admits_from_above(&self, value: f64) -> bool {
        match *self {
            Self::Unbounded => true,
            Self::Inclusive(edge) => value <= edge,
            Self::Exclusive(edge) => value < edge,
        }
    }

    fn edge(value: f64, inclusive: bool) -> Self {
        if value.is_infinite() {
            Self::Unbounded
        } else if inclusive {
            Self::Inclusive(value)
        } else {
            Self::Exclusive(value)
        }
    }
}

/// A labelled numeric range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Lower edge.
    pub lower: Bound,
    /// Upper edge.
    pub upper: Bound,
    /// Label for values inside the band.
    pub label: String,
}

impl Band {
    /// Returns true if `value` falls inside this band.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower.admits_from_below(value) && self.upper.admits_from_above(value)
    }
}

/// Ordered band table. The first band containing the value wins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BandTable {
    /// Bands in evaluation order.
    pub bands: Vec<Band>,
}

impl BandTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a band.
    #[must_use]
    pub fn band(mut self, lower: Bound, upper: Bound, label: &str) -> Self {
        self.bands.push(Band {
            lower,
            upper,
            label: label.to_string(),
        });
        self
    }

    /// Builds right-closed bins: `(e0, e1]`, `(e1, e2]`, ...
    ///
    /// Infinite edges become unbounded. Extra labels or edges are ignored.
    #[must_use]
    pub fn right_closed(edges: &[f64], labels: &[&str]) -> Self {
        edges
            .windows(2)
            .zip(labels)
            .fold(Self::new(), |table, (pair, label)| {
                table.band(Bound::edge(pair[0], false), Bound::edge(pair[1], true), label)
            })
    }

    /// Returns the label of the first band containing `value`.
    #[must_use]
    pub fn classify(&self, value: Option<f64>) -> Option<&str> {
        let value = value.filter(|v| v.is_finite())?;
        self.bands
            .iter()
            .find(|b| b.contains(value))
            .map(|b| b.label.as_str())
    }

    /// Every label in declaration order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.label.as_str()).collect()
    }
}

/// Comparison used by a threshold step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// value > t
    Above(f64),
    /// value >= t
    AtLeast(f64),
}

impl Threshold {
    fn value(&self) -> f64 {
        match *self {
            Self::Above(t) | Self::AtLeast(t) => t,
        }
    }

    fn admits(&self, value: f64) -> bool {
        match *self {
            Self::Above(t) => value > t,
            Self::AtLeast(t) => value >= t,
        }
    }
}

/// Single-valued classification by descending thresholds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdBands {
    steps: Vec<(Threshold, String)>,
    otherwise: Option<String>,
}

impl ThresholdBands {
    /// Creates an empty classifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step. Steps are kept sorted highest threshold first.
    #[must_use]
    pub fn step(mut self, threshold: Threshold, label: &str) -> Self {
        self.steps.push((threshold, label.to_string()));
        self.steps.sort_by(|a, b| b.0.value().total_cmp(&a.0.value()));
        self
    }

    /// Label for values below every threshold.
    #[must_use]
    pub fn otherwise(mut self, label: &str) -> Self {
        self.otherwise = Some(label.to_string());
        self
    }

    /// Classifies a value. Null input gives a null label.
    #[must_use]
    pub fn classify(&self, value: Option<f64>) -> Option<&str> {
        let value = value.filter(|v| v.is_finite())?;
        self.steps
            .iter()
            .find(|(t, _)| t.admits(value))
            .map(|(_, label)| label.as_str())
            .or(self.otherwise.as_deref())
    }

    /// Every label, highest band first.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.steps
            .iter()
            .map(|(_, l)| l.as_str())
            .chain(self.otherwise.as_deref())
            .collect()
    }
}

/// What a rule does when one of its inputs is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Any null input makes the output null.
    #[default]
    Propagate,
    /// Null inputs count as zero.
    ZeroFill,
}

/// Weighted linear sum over named fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightedScore {
    weights: Vec<(String, f64)>,
    null_policy: NullPolicy,
}

impl WeightedScore {
    /// Creates an empty score with the given null policy.
    #[must_use]
    pub fn new(null_policy: NullPolicy) -> Self {
        Self {
            weights: Vec::new(),
            null_policy,
        }
    }

    /// Adds a weighted field.
    #[must_use]
    pub fn weight(mut self, field: &str, weight: f64) -> Self {
        self.weights.push((field.to_string(), weight));
        self
    }

    /// Declared weight for a field.
    #[must_use]
    pub fn weight_of(&self, field: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, w)| *w)
    }

    /// Scores a row.
    #[must_use]
    pub fn score(&self, row: &Row) -> Option<f64> {
        self.weights.iter().try_fold(0.0, |acc, (field, weight)| {
            match (row.number(field), self.null_policy) {
                (Some(v), _) => Some(acc + weight * v),
                (None, NullPolicy::ZeroFill) => Some(acc),
                (None, NullPolicy::Propagate) => None,
            }
        })
    }
}

/// Text-to-code lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeTable {
    entries: Vec<(String, i64)>,
}

impl CodeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    #[must_use]
    pub fn code(mut self, text: &str, code: i64) -> Self {
        self.entries.push((text.to_string(), code));
        self
    }

    /// Looks a value up. Unmapped and null values give `None`.
    #[must_use]
    pub fn lookup(&self, value: Option<&str>) -> Option<i64> {
        let value = value?.trim();
        self.entries
            .iter()
            .find(|(text, _)| text == value)
            .map(|(_, code)| *code)
    }

    /// Every code, deduplicated, in ascending order.
    #[must_use]
    pub fn codes(&self) -> Vec<i64> {
        let mut codes: Vec<i64> = self.entries.iter().map(|(_, c)| *c).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

/// A row-wise derivation writing one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FeatureRule {
    /// Band a numeric field into a label.
    Bucket {
        /// Input field.
        source: String,
        /// Output field.
        target: String,
        /// Band table.
        table: BandTable,
    },
    /// Weighted sum over numeric fields.
    Score {
        /// Output field.
        target: String,
        /// Weights and null policy.
        score: WeightedScore,
    },
    /// Threshold classification of a numeric field.
    Classify {
        /// Input field, metric or derived.
        source: String,
        /// Output field.
        target: String,
        /// Thresholds.
        bands: ThresholdBands,
    },
    /// Hour of day of the row timestamp.
    HourOfDay {
        /// Output field.
        target: String,
    },
    /// Text attribute to integer code.
    Code {
        /// Input attribute.
        source: String,
        /// Output field.
        target: String,
        /// Lookup table.
        table: CodeTable,
    },
    /// 1 when a text attribute equals a value, 0 otherwise.
    Flag {
        /// Input attribute.
        source: String,
        /// Value that sets the flag.
        equals: String,
        /// Output field.
        target: String,
    },
}

impl FeatureRule {
    /// Name of the derived field this rule writes.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Bucket { target, .. }
            | Self::Score { target, .. }
            | Self::Classify { target, .. }
            | Self::HourOfDay { target }
            | Self::Code { target, .. }
            | Self::Flag { target, .. } => target,
        }
    }

    /// Computes this rule's value for a row.
    #[must_use]
    pub fn evaluate(&self, row: &Row) -> FieldValue {
        match self {
            Self::Bucket { source, table, .. } => {
                FieldValue::from_opt_text(table.classify(row.number(source)))
            }
            Self::Score { score, .. } => FieldValue::from_opt_f64(score.score(row)),
            Self::Classify { source, bands, .. } => {
                FieldValue::from_opt_text(bands.classify(row.number(source)))
            }
            Self::HourOfDay { .. } => row
                .timestamp
                .map_or(FieldValue::Null, |ts| FieldValue::Int(i64::from(ts.hour()))),
            Self::Code { source, table, .. } => table
                .lookup(row.attribute(source))
                .map_or(FieldValue::Null, FieldValue::Int),
            Self::Flag { source, equals, .. } => row
                .attribute(source)
                .map_or(FieldValue::Null, |v| FieldValue::Int(i64::from(v.trim() == equals))),
        }
    }

    /// Evaluates the rule and stores the result on the row.
    pub fn apply(&self, row: &mut Row) {
        let value = self.evaluate(row);
        row.set_derived(self.target(), value);
    }
}

/// A step that looks at the whole row set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum DatasetStep {
    /// Drop rows where every listed metric is null.
    DropEmpty {
        /// Metrics checked.
        metrics: Vec<String>,
    },
    /// Replace null values of a metric with the median of the others.
    ImputeMedian {
        /// Metric to fill.
        metric: String,
    },
}

impl DatasetStep {
    /// Applies the step.
    #[must_use]
    pub fn apply(&self, mut rows: Vec<Row>) -> Vec<Row> {
        match self {
            Self::DropEmpty { metrics } => {
                rows.retain(|row| metrics.iter().any(|m| row.metric(m).is_some()));
                rows
            }
            Self::ImputeMedian { metric } => {
                let values: Vec<f64> = rows.iter().filter_map(|r| r.metric(metric)).collect();
                if let Some(fill) = median(values) {
                    for row in rows.iter_mut().filter(|r| r.metric(metric).is_none()) {
                        row.metrics.insert(metric.clone(), Some(fill));
                    }
                }
                rows
            }
        }
    }
}

/// Median of a sample; mean of the two middle values for even sizes.
#[must_use]
pub fn median(mut values: Vec<f64>) -> Option<f64> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Ordered set of dataset steps and row rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureEngine {
    steps: Vec<DatasetStep>,
    rules: Vec<FeatureRule>,
}

impl FeatureEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dataset-level step.
    #[must_use]
    pub fn step(mut self, step: DatasetStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Adds a row rule. Rules run in insertion order, so later rules may read
    /// fields written by earlier ones.
    #[must_use]
    pub fn rule(mut self, rule: FeatureRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Declared row rules.
    #[must_use]
    pub fn rules(&self) -> &[FeatureRule] {
        &self.rules
    }

    /// Finds the rule writing a given field.
    #[must_use]
    pub fn rule_for(&self, target: &str) -> Option<&FeatureRule> {
        self.rules.iter().find(|r| r.target() == target)
    }

    /// Applies every row rule to one row.
    pub fn apply_row(&self, row: &mut Row) {
        for rule in &self.rules {
            rule.apply(row);
        }
    }

    /// Runs dataset steps, then row rules, preserving row order.
    #[must_use]
    pub fn engineer(&self, rows: Vec<Row>) -> Vec<Row> {
        let mut rows = self.steps.iter().fold(rows, |rows, step| step.apply(rows));
        for row in &mut rows {
            self.apply_row(row);
        }
        rows
    }

    /// Flattens the successful partitions into rows and engineers them.
    #[must_use]
    pub fn engineer_partitions(&self, partitions: &[RawPartition]) -> Vec<Row> {
        let rows = partitions
            .iter()
            .filter(|p| p.is_success())
            .flat_map(|p| {
                p.observations
                    .iter()
                    .map(move |obs| Row::from_observation(p.key.clone(), obs))
            })
            .collect();
        self.engineer(rows)
    }
}
