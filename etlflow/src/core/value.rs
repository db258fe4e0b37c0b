//! Flat record values exchanged with the staged artifact and the remote store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single nullable cell.
///
/// Serializes to the plain JSON scalar (`null`, `true`, `3`, `2.5`, `"x"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    /// Missing value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl FieldValue {
    /// Returns true for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value. Text is parsed leniently.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) if f.is_finite() => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Integer view of the value. Floats with a fractional part are rejected.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    /// Text view of the value. Numbers are rendered.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Builds a float cell, mapping `None` and non-finite values to null.
    #[must_use]
    pub fn from_opt_f64(value: Option<f64>) -> Self {
        value.filter(|v| v.is_finite()).map_or(Self::Null, Self::Float)
    }

    /// Builds a text cell, mapping `None` to null.
    #[must_use]
    pub fn from_opt_text(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |s| Self::Text(s.to_string()))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::from_opt_f64(Some(v))
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A flat key-value record, ordered by column name.
pub type Record = BTreeMap<String, FieldValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_roundtrip_through_json() {
        let json = r#"{"a": null, "b": 3, "c": 2.5, "d": "x", "e": true}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record["a"], FieldValue::Null);
        assert_eq!(record["b"], FieldValue::Int(3));
        assert_eq!(record["c"], FieldValue::Float(2.5));
        assert_eq!(record["d"], FieldValue::Text("x".into()));
        assert_eq!(record["e"], FieldValue::Bool(true));
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(FieldValue::Text(" 29.85 ".into()).as_f64(), Some(29.85));
        assert_eq!(FieldValue::Text(" ".into()).as_f64(), None);
        assert_eq!(FieldValue::Float(2.0).as_i64(), Some(2));
        assert_eq!(FieldValue::Float(2.5).as_i64(), None);
        assert_eq!(FieldValue::Text("1.0".into()).as_i64(), Some(1));
        assert_eq!(FieldValue::from_opt_f64(Some(f64::NAN)), FieldValue::Null);
    }

    #[test]
    fn test_display_null_is_empty() {
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::Int(7).to_string(), "7");
    }
}
