//! Loosely-structured records and NDJSON record input.

use std::collections::BTreeMap;
use std::io::BufRead;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;

/// A structured record: field name → JSON value, unordered, keys unique.
///
/// Record-processing stages never hand records to user code directly; the
/// per-record handler sees them through [`crate::RecordProxy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `field`, if any.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Store `value` under `field`, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Whether `field` is present with a non-null value. Contract checks
    /// treat null the same as absent.
    pub fn has(&self, field: &str) -> bool {
        matches!(self.fields.get(field), Some(value) if !value.is_null())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Read newline-delimited JSON records; blank lines are skipped.
///
/// The first malformed line aborts the read, reporting its 1-based line
/// number.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<Record>, PipelineError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| PipelineError::Read(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record =
            serde_json::from_str::<Record>(&line).map_err(|e| PipelineError::Parse {
                line: index + 1,
                message: e.to_string(),
            })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn set_then_get_round_trips() {
        let mut record = Record::new();
        record.set("url", "http://example.com/rss");
        assert_eq!(record.get("url"), Some(&json!("http://example.com/rss")));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn null_counts_as_absent_for_contracts() {
        let mut record = Record::new();
        record.set("a", Value::Null);
        assert!(!record.has("a"));
        assert_eq!(record.get("a"), Some(&Value::Null));
        record.set("a", 1);
        assert!(record.has("a"));
    }

    #[test]
    fn from_iter_collects_fields() {
        let record = Record::from_iter([("a", json!(1)), ("b", json!("x"))]);
        assert_eq!(record.len(), 2);
        assert!(record.has("a"));
        assert!(record.has("b"));
    }

    #[test]
    fn reads_ndjson_lines_skipping_blanks() {
        let input = "{\"a\": 1}\n\n{\"b\": \"x\"}\n";
        let records = read_records(Cursor::new(input)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("a"), Some(&json!(1)));
        assert_eq!(records[1].get("b"), Some(&json!("x")));
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let input = "{\"a\": 1}\nnot json\n";
        match read_records(Cursor::new(input)) {
            Err(PipelineError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn reads_records_from_a_file() {
        use std::io::Write as _;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"dept\": \"SALES\", \"salary\": 50000}}").unwrap();
        writeln!(file, "{{\"dept\": \"ENGINEER\", \"salary\": 75000}}").unwrap();
        let reader = std::io::BufReader::new(std::fs::File::open(file.path()).unwrap());
        let records = read_records(reader).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("dept"), Some(&json!("SALES")));
    }
}
