//! Fixed, versioned table schemas.
//!
//! A schema decides which columns a flat record has, how row fields map onto
//! them and what type each cell is coerced to. It also renders the idempotent
//! DDL the loader runs before the first insert.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::row::Row;
use super::timestamps::{format_timestamp, parse_timestamp_lenient};
use super::value::{FieldValue, Record};
use crate::errors::FieldAbsent;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Free text.
    Text,
    /// Floating point number.
    Float,
    /// Integer.
    Integer,
    /// Naive timestamp rendered as ISO text.
    Timestamp,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

impl ColumnKind {
    /// Coerces a value to this kind. Values that do not fit become null.
    #[must_use]
    pub fn coerce(&self, value: &FieldValue) -> FieldValue {
        if value.is_null() {
            return FieldValue::Null;
        }
        match self {
            Self::Text => value.as_text().map_or(FieldValue::Null, FieldValue::Text),
            Self::Float => FieldValue::from_opt_f64(value.as_f64()),
            Self::Integer => value.as_i64().map_or(FieldValue::Null, FieldValue::Int),
            Self::Timestamp => value
                .as_text()
                .and_then(|s| parse_timestamp_lenient(&s))
                .map_or(FieldValue::Null, |ts| FieldValue::Text(format_timestamp(&ts))),
        }
    }

    /// Parses a raw CSV cell. Empty cells are null.
    #[must_use]
    pub fn parse_cell(&self, raw: &str) -> FieldValue {
        if raw.trim().is_empty() {
            return FieldValue::Null;
        }
        self.coerce(&FieldValue::Text(raw.to_string()))
    }
}

/// Where a column takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    /// The row's partition key.
    Partition,
    /// The row's timestamp.
    Time,
    /// A named metric, attribute or derived field.
    Field(String),
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name, lowercase.
    pub name: String,
    /// Storage type.
    pub kind: ColumnKind,
    /// Value source.
    pub source: ColumnSource,
}

/// A fixed, versioned table layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Destination table name.
    pub table: String,
    /// Schema version, bumped whenever columns change.
    pub version: u32,
    /// Columns in output order.
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(table: impl Into<String>, version: u32) -> Self {
        Self {
            table: table.into(),
            version,
            columns: Vec::new(),
        }
    }

    /// Adds a column fed by the field of the same name.
    #[must_use]
    pub fn column(self, name: &str, kind: ColumnKind) -> Self {
        self.column_from(name, kind, ColumnSource::Field(name.to_string()))
    }

    /// Adds a column with an explicit source.
    #[must_use]
    pub fn column_from(mut self, name: &str, kind: ColumnKind, source: ColumnSource) -> Self {
        self.columns.push(ColumnDef {
            name: name.trim().to_lowercase(),
            kind,
            source,
        });
        self
    }

    /// Returns the schema pointed at a different table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Column names in output order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks up a column definition.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Renders the create-if-absent DDL for this schema.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        let mut lines = vec!["    id BIGSERIAL PRIMARY KEY".to_string()];
        lines.extend(
            self.columns
                .iter()
                .map(|c| format!("    {} {}", c.name, c.kind)),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
            self.table,
            lines.join(",\n")
        )
    }

    /// Projects a row onto this schema.
    ///
    /// Every column is present in the result; fields the row lacks are null.
    #[must_use]
    pub fn project(&self, row: &Row) -> Record {
        self.columns
            .iter()
            .map(|col| {
                let raw = match &col.source {
                    ColumnSource::Partition => FieldValue::Text(row.partition.clone()),
                    ColumnSource::Time => row
                        .timestamp
                        .as_ref()
                        .map_or(FieldValue::Null, |ts| FieldValue::Text(format_timestamp(ts))),
                    ColumnSource::Field(name) => row.field(name).unwrap_or_default(),
                };
                (col.name.clone(), col.kind.coerce(&raw))
            })
            .collect()
    }

    /// Projects a row set onto this schema.
    #[must_use]
    pub fn project_all(&self, rows: &[Row]) -> Vec<Record> {
        rows.iter().map(|r| self.project(r)).collect()
    }

    /// Coerces an externally produced record to this schema's types.
    ///
    /// Keys are normalised to lowercase. Unknown columns are kept as-is and
    /// declared columns the record lacks stay absent, so callers can still
    /// tell "absent" from "null".
    #[must_use]
    pub fn conform(&self, record: &Record) -> Record {
        record
            .iter()
            .map(|(k, v)| {
                let key = k.trim().to_lowercase();
                let value = self.get(&key).map_or_else(|| v.clone(), |c| c.kind.coerce(v));
                (key, value)
            })
            .collect()
    }

    /// Returns the declared columns missing from a header set.
    #[must_use]
    pub fn missing_columns<'a>(
        &self,
        present: impl IntoIterator<Item = &'a str>,
    ) -> Vec<FieldAbsent> {
        let present: BTreeSet<&str> = present.into_iter().collect();
        self.columns
            .iter()
            .filter(|c| !present.contains(c.name.as_str()))
            .map(|c| FieldAbsent::new(&c.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row::Observation;
    use crate::core::timestamps::parse_timestamp;
    use pretty_assertions::assert_eq;

    fn schema() -> TableSchema {
        TableSchema::new("readings", 1)
            .column_from("city", ColumnKind::Text, ColumnSource::Partition)
            .column_from("time", ColumnKind::Timestamp, ColumnSource::Time)
            .column("pm2_5", ColumnKind::Float)
            .column("hour", ColumnKind::Integer)
    }

    #[test]
    fn test_create_table_sql() {
        let sql = schema().create_table_sql();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS readings (\n    id BIGSERIAL PRIMARY KEY,\n    city TEXT,\n    time TIMESTAMP,\n    pm2_5 FLOAT,\n    hour INTEGER\n);"
        );
    }

    #[test]
    fn test_project_fills_missing_with_null() {
        let obs = Observation::at(parse_timestamp("2024-05-01T07:00").ok())
            .with_metric("pm2_5", Some(12.5));
        let row = Row::from_observation("Delhi", &obs);
        let record = schema().project(&row);

        assert_eq!(record["city"], FieldValue::Text("Delhi".into()));
        assert_eq!(record["time"], FieldValue::Text("2024-05-01T07:00:00".into()));
        assert_eq!(record["pm2_5"], FieldValue::Float(12.5));
        assert_eq!(record["hour"], FieldValue::Null);
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn test_conform_lowercases_and_coerces() {
        let mut raw = Record::new();
        raw.insert("PM2_5 ".into(), FieldValue::Text("3.5".into()));
        raw.insert("Hour".into(), FieldValue::Float(4.0));
        raw.insert("extra".into(), FieldValue::Bool(true));

        let record = schema().conform(&raw);
        assert_eq!(record["pm2_5"], FieldValue::Float(3.5));
        assert_eq!(record["hour"], FieldValue::Int(4));
        assert_eq!(record["extra"], FieldValue::Bool(true));
        assert!(!record.contains_key("city"));
    }

    #[test]
    fn test_missing_columns() {
        let missing = schema().missing_columns(["city", "pm2_5"]);
        assert_eq!(missing, vec![FieldAbsent::new("time"), FieldAbsent::new("hour")]);
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(ColumnKind::Float.parse_cell(""), FieldValue::Null);
        assert_eq!(ColumnKind::Integer.parse_cell("2"), FieldValue::Int(2));
        assert_eq!(ColumnKind::Text.parse_cell("Low"), FieldValue::Text("Low".into()));
    }
}
