//! Data-driven driver (C14): loads inline and CSV parameter rows and
//! runs a case once per row.
//!
//! `csv` is a new dependency introduced here -- no repo in the
//! example pack carries one, but `cbaugus-rust_loadtest`'s
//! `YamlDataFile { path, format: "csv", strategy }` config shape is
//! grounding for what a data-file declaration should look like, even
//! though that repo never implements the actual parsing. Parallel
//! runs reuse `loop_driver::run` so output stays in logical row
//! order regardless of completion order.

use crate::error::EngineError;
use crate::model::Ddts;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub fn load_rows(ddts: &Ddts, case_dir: &Path) -> Result<Vec<HashMap<String, Value>>, EngineError> {
    let mut rows = ddts.rows.clone();
    if let Some(csv_path) = &ddts.csv {
        rows.extend(load_csv_rows(case_dir, csv_path)?);
    }
    Ok(rows)
}

fn load_csv_rows(case_dir: &Path, csv_path: &str) -> Result<Vec<HashMap<String, Value>>, EngineError> {
    let path = case_dir.join(csv_path);
    if !path.exists() {
        return Err(EngineError::CsvFileNotFound(path.display().to_string()));
    }
    let mut reader = csv::Reader::from_path(&path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = HashMap::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), infer_value(field));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// CSV fields are plain text; infer numbers/bools so downstream
/// comparators see native JSON types instead of everything-as-string.
fn infer_value(field: &str) -> Value {
    if let Ok(i) = field.parse::<i64>() {
        Value::from(i)
    } else if let Ok(f) = field.parse::<f64>() {
        serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::String(field.to_string()))
    } else if field == "true" || field == "false" {
        Value::Bool(field == "true")
    } else {
        Value::String(field.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn inline_rows_pass_through() {
        let mut row = HashMap::new();
        row.insert("id".to_string(), Value::from(1));
        let ddts = Ddts {
            rows: vec![row],
            csv: None,
            parallel: false,
        };
        let dir = tempfile::tempdir().unwrap();
        let rows = load_rows(&ddts, dir.path()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn csv_rows_are_parsed_and_type_inferred() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("data.csv");
        let mut file = std::fs::File::create(&csv_path).unwrap();
        writeln!(file, "id,name,active").unwrap();
        writeln!(file, "1,ada,true").unwrap();
        writeln!(file, "2,grace,false").unwrap();

        let ddts = Ddts {
            rows: vec![],
            csv: Some("data.csv".to_string()),
            parallel: false,
        };
        let rows = load_rows(&ddts, dir.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::from(1)));
        assert_eq!(rows[0].get("active"), Some(&Value::Bool(true)));
        assert_eq!(rows[1].get("name"), Some(&Value::String("grace".to_string())));
    }

    #[test]
    fn missing_csv_file_is_a_typed_error() {
        let ddts = Ddts {
            rows: vec![],
            csv: Some("missing.csv".to_string()),
            parallel: false,
        };
        let dir = tempfile::tempdir().unwrap();
        let result = load_rows(&ddts, dir.path());
        assert!(matches!(result, Err(EngineError::CsvFileNotFound(_))));
    }
}
