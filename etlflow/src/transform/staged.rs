//! Staged CSV artifact.
//!
//! The header is the schema's column list, lowercase and trimmed. Nulls are
//! written as empty fields. Reading normalises headers the same way, so an
//! artifact produced by another tool with `MonthlyCharges` style headers
//! still lines up with the schema.

use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::fs;
use std::path::Path;

use crate::core::{FieldValue, Record, TableSchema};
use crate::errors::EtlError;

/// Normalises a header cell.
#[must_use]
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Writes records as CSV in schema column order.
pub fn write_staged(path: &Path, schema: &TableSchema, records: &[Record]) -> Result<(), EtlError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new().from_path(path)?;
    let columns = schema.column_names();
    writer.write_record(&columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|c| {
            record.get(*c).map(ToString::to_string).unwrap_or_default()
        }))?;
    }
    writer.flush()?;
    tracing::debug!(path = %path.display(), rows = records.len(), "Wrote staged artifact");
    Ok(())
}

/// Reads a staged CSV back into records.
///
/// Declared columns are parsed to their kind; unknown columns are kept as text.
pub fn read_staged(path: &Path, schema: &TableSchema) -> Result<Vec<Record>, EtlError> {
    let mut reader = ReaderBuilder::new().trim(Trim::Headers).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| {
                let value = match schema.get(name) {
                    Some(col) => col.kind.parse_cell(cell),
                    None if cell.trim().is_empty() => FieldValue::Null,
                    None => FieldValue::Text(cell.to_string()),
                };
                (name.clone(), value)
            })
            .collect();
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnKind;
    use pretty_assertions::assert_eq;

    fn schema() -> TableSchema {
        TableSchema::new("t", 1)
            .column("city", ColumnKind::Text)
            .column("pm2_5", ColumnKind::Float)
            .column("hour", ColumnKind::Integer)
    }

    #[test]
    fn test_write_then_read_keeps_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged").join("out.csv");
        let records = vec![
            Record::from([
                ("city".to_string(), FieldValue::from("Delhi")),
                ("pm2_5".to_string(), FieldValue::Float(12.5)),
                ("hour".to_string(), FieldValue::Int(3)),
            ]),
            Record::from([
                ("city".to_string(), FieldValue::from("Mumbai")),
                ("pm2_5".to_string(), FieldValue::Null),
                ("hour".to_string(), FieldValue::Null),
            ]),
        ];
        write_staged(&path, &schema(), &records).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "city,pm2_5,hour\nDelhi,12.5,3\nMumbai,,\n");
        assert_eq!(read_staged(&path, &schema()).unwrap(), records);
    }

    #[test]
    fn test_read_normalises_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        std::fs::write(&path, " City ,PM2_5,Extra\nDelhi,7,x\n").unwrap();

        let records = read_staged(&path, &schema()).unwrap();
        assert_eq!(records[0]["city"], FieldValue::Text("Delhi".into()));
        assert_eq!(records[0]["pm2_5"], FieldValue::Float(7.0));
        assert_eq!(records[0]["extra"], FieldValue::Text("x".into()));
    }

    #[test]
    fn test_missing_file_is_csv_error() {
        let err = read_staged(Path::new("/nonexistent/staged.csv"), &schema()).unwrap_err();
        assert_eq!(err.kind(), "csv");
    }
}
