//! Hourly air-quality readings.

use super::{DatasetKind, DatasetProfile};
use crate::analyze::{AnalysisSpec, TopMean};
use crate::core::{ColumnKind, ColumnSource, TableSchema};
use crate::extract::PayloadFormat;
use crate::transform::{
    BandTable, Bound, DatasetStep, FeatureEngine, FeatureRule, NullPolicy, Threshold,
    ThresholdBands, WeightedScore,
};
use crate::validate::ValidationRules;

/// Metrics requested from the source. A row must have at least one.
const REQUIRED_METRICS: [&str; 7] = [
    "pm10",
    "pm2_5",
    "carbon_monoxide",
    "nitrogen_dioxide",
    "sulphur_dioxide",
    "ozone",
    "uv_index",
];

const RISK_LABELS: [&str; 3] = ["High Risk", "Moderate Risk", "Low Risk"];

fn aqi_bands() -> BandTable {
    BandTable::new()
        .band(Bound::Unbounded, Bound::Inclusive(50.0), "Good")
        .band(Bound::Exclusive(50.0), Bound::Inclusive(100.0), "Moderate")
        .band(Bound::Exclusive(100.0), Bound::Inclusive(200.0), "Unhealthy")
        .band(Bound::Exclusive(200.0), Bound::Inclusive(300.0), "Very Unhealthy")
        .band(Bound::Exclusive(300.0), Bound::Unbounded, "Hazardous")
}

fn severity() -> WeightedScore {
    WeightedScore::new(NullPolicy::ZeroFill)
        .weight("pm2_5", 5.0)
        .weight("pm10", 3.0)
        .weight("nitrogen_dioxide", 4.0)
        .weight("sulphur_dioxide", 4.0)
        .weight("carbon_monoxide", 2.0)
        .weight("ozone", 3.0)
}

fn risk_bands() -> ThresholdBands {
    ThresholdBands::new()
        .step(Threshold::Above(400.0), "High Risk")
        .step(Threshold::Above(200.0), "Moderate Risk")
        .otherwise("Low Risk")
}

pub(super) fn engine() -> FeatureEngine {
    FeatureEngine::new()
        .step(DatasetStep::DropEmpty {
            metrics: REQUIRED_METRICS.iter().map(ToString::to_string).collect(),
        })
        .rule(FeatureRule::Bucket {
            source: "pm2_5".into(),
            target: "aqi_category".into(),
            table: aqi_bands(),
        })
        .rule(FeatureRule::Score {
            target: "severity_score".into(),
            score: severity(),
        })
        .rule(FeatureRule::Classify {
            source: "severity_score".into(),
            target: "risk_flag".into(),
            bands: risk_bands(),
        })
        .rule(FeatureRule::HourOfDay {
            target: "hour".into(),
        })
}

fn schema() -> TableSchema {
    let schema = TableSchema::new(DatasetKind::AirQuality.default_table(), 1)
        .column_from("city", ColumnKind::Text, ColumnSource::Partition)
        .column_from("time", ColumnKind::Timestamp, ColumnSource::Time);
    REQUIRED_METRICS
        .iter()
        .fold(schema, |s, m| s.column(m, ColumnKind::Float))
        .column("aqi_category", ColumnKind::Text)
        .column("severity_score", ColumnKind::Float)
        .column("risk_flag", ColumnKind::Text)
        .column("hour", ColumnKind::Integer)
}

fn rules() -> ValidationRules {
    ValidationRules::new()
        .null_check("pm2_5")
        .null_check("pm10")
        .null_check("severity_score")
        .expect_categories(
            "aqi_category",
            &["Good", "Moderate", "Unhealthy", "Very Unhealthy", "Hazardous"],
        )
        .expect_categories("risk_flag", &RISK_LABELS)
        .code_domain("hour", &(0..24).collect::<Vec<_>>())
}

fn analysis() -> AnalysisSpec {
    AnalysisSpec::new("city")
        .top_mean(TopMean::new("city_highest_avg_pm2_5", "pm2_5"))
        .top_mean(TopMean::new("city_highest_avg_severity", "severity_score"))
        .label_shares("risk_flag", &RISK_LABELS)
        .peak_hour("hour_of_day_worst_aqi", "pm2_5")
        .distribution("risk_flag")
        .trends(&["pm2_5", "pm10", "ozone"])
}

pub(super) fn profile() -> DatasetProfile {
    DatasetProfile {
        kind: DatasetKind::AirQuality,
        payload: PayloadFormat::HourlySeries {
            metrics: REQUIRED_METRICS.iter().map(ToString::to_string).collect(),
        },
        engine: engine(),
        schema: schema(),
        rules: rules(),
        analysis: analysis(),
        staged_file: "air_quality_transformed.csv".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timestamps::parse_timestamp;
    use crate::core::{FieldValue, Observation, Row};
    use pretty_assertions::assert_eq;

    fn reading(values: &[(&str, Option<f64>)]) -> Row {
        let obs = values.iter().fold(
            Observation::at(parse_timestamp("2024-05-01T13:00").ok()),
            |obs, (name, v)| obs.with_metric(*name, *v),
        );
        Row::from_observation("Delhi", &obs)
    }

    #[test]
    fn test_aqi_boundaries() {
        let table = aqi_bands();
        assert_eq!(table.classify(Some(50.0)), Some("Good"));
        assert_eq!(table.classify(Some(50.1)), Some("Moderate"));
        assert_eq!(table.classify(Some(200.0)), Some("Unhealthy"));
        assert_eq!(table.classify(Some(300.0)), Some("Very Unhealthy"));
        assert_eq!(table.classify(Some(300.5)), Some("Hazardous"));
        assert_eq!(table.classify(Some(-1.0)), Some("Good"));
    }

    #[test]
    fn test_severity_and_risk() {
        let rows = engine().engineer(vec![reading(&[
            ("pm2_5", Some(40.0)),
            ("pm10", Some(60.0)),
            ("nitrogen_dioxide", Some(10.0)),
            ("sulphur_dioxide", Some(5.0)),
            ("carbon_monoxide", Some(100.0)),
            ("ozone", Some(20.0)),
        ])]);
        let row = &rows[0];
        // 200 + 180 + 40 + 20 + 200 + 60
        assert_eq!(row.derived("severity_score"), &FieldValue::Float(700.0));
        assert_eq!(row.derived("risk_flag"), &FieldValue::Text("High Risk".into()));
        assert_eq!(row.derived("aqi_category"), &FieldValue::Text("Good".into()));
        assert_eq!(row.derived("hour"), &FieldValue::Int(13));
    }

    #[test]
    fn test_missing_pollutant_lowers_score_by_its_weighted_value() {
        let full = reading(&[("pm2_5", Some(30.0)), ("ozone", Some(12.0))]);
        let partial = reading(&[("pm2_5", Some(30.0)), ("ozone", None)]);
        let score = severity();
        let diff = score.score(&full).unwrap() - score.score(&partial).unwrap();
        assert!((diff - 3.0 * 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_null_pm2_5_keeps_row_with_null_category() {
        let rows = engine().engineer(vec![
            reading(&[("pm2_5", None), ("pm10", Some(80.0))]),
            reading(&[("pm2_5", None), ("uv_index", None)]),
        ]);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].derived("aqi_category").is_null());
        assert_eq!(rows[0].derived("severity_score"), &FieldValue::Float(240.0));
        assert_eq!(rows[0].derived("risk_flag"), &FieldValue::Text("Moderate Risk".into()));
    }

    #[test]
    fn test_schema_ddl_columns() {
        let sql = schema().create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS air_quality_data ("));
        assert!(sql.contains("    time TIMESTAMP,"));
        assert!(sql.contains("    uv_index FLOAT,"));
        assert!(sql.contains("    hour INTEGER\n);"));
        assert_eq!(schema().columns.len(), 13);
    }
}
