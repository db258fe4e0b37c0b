//! Dataset profiles.
//!
//! A profile bundles everything that differs between the supported datasets:
//! payload decoding, feature rules, the table schema, reconciliation rules
//! and the analysis report layout. Components take a profile and stay
//! dataset-agnostic.

mod air_quality;
mod churn;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analyze::AnalysisSpec;
use crate::core::TableSchema;
use crate::extract::PayloadFormat;
use crate::transform::FeatureEngine;
use crate::validate::ValidationRules;

/// Supported datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Hourly air-quality readings per city.
    #[default]
    AirQuality,
    /// Telco customer churn extract.
    Churn,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AirQuality => write!(f, "air_quality"),
            Self::Churn => write!(f, "churn"),
        }
    }
}

impl DatasetKind {
    /// Destination table used when the configuration names none.
    #[must_use]
    pub fn default_table(&self) -> &'static str {
        match self {
            Self::AirQuality => "air_quality_data",
            Self::Churn => "churn_data",
        }
    }

    /// Builds the full profile for this dataset.
    #[must_use]
    pub fn profile(&self) -> DatasetProfile {
        match self {
            Self::AirQuality => air_quality::profile(),
            Self::Churn => churn::profile(),
        }
    }
}

/// Everything the pipeline needs to know about one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetProfile {
    /// Which dataset this is.
    pub kind: DatasetKind,
    /// How raw payloads decode into observations.
    pub payload: PayloadFormat,
    /// Feature rules.
    pub engine: FeatureEngine,
    /// Table layout for the staged artifact and the remote store.
    pub schema: TableSchema,
    /// Post-load reconciliation rules.
    pub rules: ValidationRules,
    /// Report layout.
    pub analysis: AnalysisSpec,
    /// File name of the staged artifact.
    pub staged_file: String,
}

impl DatasetProfile {
    /// Returns the profile pointed at a different destination table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.schema = self.schema.with_table(table);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_and_display() {
        let kind: DatasetKind = serde_json::from_str("\"churn\"").unwrap();
        assert_eq!(kind, DatasetKind::Churn);
        assert_eq!(
            serde_json::to_string(&DatasetKind::AirQuality).unwrap(),
            "\"air_quality\""
        );
        assert_eq!(DatasetKind::Churn.to_string(), "churn");
    }

    #[test]
    fn test_profiles_point_at_default_tables() {
        for kind in [DatasetKind::AirQuality, DatasetKind::Churn] {
            let profile = kind.profile();
            assert_eq!(profile.kind, kind);
            assert_eq!(profile.schema.table, kind.default_table());
        }
        let renamed = DatasetKind::Churn.profile().with_table("churn_v2");
        assert_eq!(renamed.schema.table, "churn_v2");
    }

    #[test]
    fn test_every_rule_target_is_a_schema_column() {
        for kind in [DatasetKind::AirQuality, DatasetKind::Churn] {
            let profile = kind.profile();
            for rule in profile.engine.rules() {
                assert!(
                    profile.schema.get(rule.target()).is_some(),
                    "{kind}: {} has no column",
                    rule.target()
                );
            }
        }
    }
}
