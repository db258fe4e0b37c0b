//! Raw payload decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::timestamps::parse_timestamp_lenient;
use crate::core::Observation;
use crate::errors::EtlError;

/// Shape of a raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum PayloadFormat {
    /// `{"hourly": {"time": [...], "<metric>": [...], ...}}` with arrays
    /// aligned by index.
    HourlySeries {
        /// Metrics read from the series. Also sent as the `hourly` query.
        metrics: Vec<String>,
    },
    /// A JSON array of flat objects, one per observation.
    RecordArray {
        /// Fields read as numbers. Every other field is a text attribute.
        metrics: Vec<String>,
    },
}

impl PayloadFormat {
    /// Metric names this format extracts.
    #[must_use]
    pub fn metrics(&self) -> &[String] {
        match self {
            Self::HourlySeries { metrics } | Self::RecordArray { metrics } => metrics,
        }
    }

    /// Decodes a payload into observations, in source order.
    ///
    /// Missing or non-numeric metric cells decode as null. Only a payload of
    /// the wrong overall shape is an error.
    pub fn decode(&self, payload: &Value) -> Result<Vec<Observation>, EtlError> {
        match self {
            Self::HourlySeries { metrics } => decode_hourly(payload, metrics),
            Self::RecordArray { metrics } => decode_records(payload, metrics),
        }
    }
}

fn decode_hourly(payload: &Value, metrics: &[String]) -> Result<Vec<Observation>, EtlError> {
    let hourly = payload
        .get("hourly")
        .and_then(Value::as_object)
        .ok_or_else(|| EtlError::Decode("payload has no 'hourly' object".to_string()))?;

    let times = match hourly.get("time") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(times)) => times,
        Some(_) => return Err(EtlError::Decode("'hourly.time' is not an array".to_string())),
    };

    let observations = times
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            let timestamp = ts.as_str().and_then(parse_timestamp_lenient);
            metrics.iter().fold(Observation::at(timestamp), |obs, metric| {
                let value = hourly
                    .get(metric)
                    .and_then(|series| series.get(i))
                    .and_then(number);
                obs.with_metric(metric.as_str(), value)
            })
        })
        .collect();
    Ok(observations)
}

fn decode_records(payload: &Value, metrics: &[String]) -> Result<Vec<Observation>, EtlError> {
    let items = payload
        .as_array()
        .ok_or_else(|| EtlError::Decode("payload is not an array of records".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let fields = item
                .as_object()
                .ok_or_else(|| EtlError::Decode(format!("record {i} is not an object")))?;
            let mut obs = Observation::at(None);
            for (name, value) in fields {
                let name = name.trim();
                if metrics.iter().any(|m| m == name) {
                    obs = obs.with_metric(name, number(value));
                } else {
                    obs = obs.with_attribute(name, text(value).as_deref());
                }
            }
            Ok(obs)
        })
        .collect()
}

/// Numeric view of a JSON cell. Strings are parsed; blanks are null.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timestamps::parse_timestamp;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn hourly() -> PayloadFormat {
        PayloadFormat::HourlySeries {
            metrics: vec!["pm2_5".into(), "pm10".into()],
        }
    }

    #[test]
    fn test_hourly_series_aligned_by_index() {
        let payload = json!({
            "hourly": {
                "time": ["2024-05-01T00:00", "2024-05-01T01:00", "bogus"],
                "pm2_5": [10.5, null, 3],
                "pm10": [20.0]
            }
        });
        let obs = hourly().decode(&payload).unwrap();

        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].timestamp, parse_timestamp("2024-05-01T00:00").ok());
        assert_eq!(obs[0].metrics["pm2_5"], Some(10.5));
        assert_eq!(obs[0].metrics["pm10"], Some(20.0));
        assert_eq!(obs[1].metrics["pm2_5"], None);
        assert_eq!(obs[1].metrics["pm10"], None);
        assert_eq!(obs[2].timestamp, None);
        assert_eq!(obs[2].metrics["pm2_5"], Some(3.0));
    }

    #[test]
    fn test_hourly_without_time_is_empty() {
        let obs = hourly().decode(&json!({"hourly": {"pm2_5": [1.0]}})).unwrap();
        assert!(obs.is_empty());
    }

    #[test]
    fn test_wrong_shape_is_decode_error() {
        let err = hourly().decode(&json!({"error": true})).unwrap_err();
        assert_eq!(err.kind(), "decode");

        let records = PayloadFormat::RecordArray { metrics: vec![] };
        assert_eq!(records.decode(&json!({"a": 1})).unwrap_err().kind(), "decode");
        assert_eq!(records.decode(&json!([1, 2])).unwrap_err().kind(), "decode");
    }

    #[test]
    fn test_record_array_splits_metrics_and_attributes() {
        let format = PayloadFormat::RecordArray {
            metrics: vec!["tenure".into(), "TotalCharges".into()],
        };
        let payload = json!([
            {"customerID": "0001", "tenure": "12", "TotalCharges": " ", "Contract": "One year"},
            {"customerID": "0002", "tenure": 3, "TotalCharges": "29.85", "Contract": ""}
        ]);
        let obs = format.decode(&payload).unwrap();

        assert_eq!(obs[0].metrics["tenure"], Some(12.0));
        assert_eq!(obs[0].metrics["TotalCharges"], None);
        assert_eq!(obs[0].attributes["Contract"], Some("One year".to_string()));
        assert_eq!(obs[1].metrics["TotalCharges"], Some(29.85));
        assert_eq!(obs[1].attributes["Contract"], None);
        assert_eq!(format.metrics().len(), 2);
    }
}
