use crate::document_parser::ParsedRecord;
use serde::Serialize;
use serde_json::Value;

/// Field attached to every record
pub const DATE_FIELD: &str = "date";

/// A parsed record carrying the request date
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StampedRecord(ParsedRecord);

impl StampedRecord {
    /// The stamped date
    pub fn date(&self) -> Option<&str> {
        self.0.get(DATE_FIELD).and_then(Value::as_str)
    }

    /// All fields in column order
    pub fn fields(&self) -> &ParsedRecord {
        &self.0
    }
}

/// Attach `date` verbatim to every record.
///
/// An existing `date` column is overwritten in place; otherwise the field is
/// appended after the extracted columns. One output per input, same order.
pub fn stamp_records(records: Vec<ParsedRecord>, date: &str) -> Vec<StampedRecord> {
    records
        .into_iter()
        .map(|mut record| {
            record.insert(DATE_FIELD.to_string(), Value::String(date.to_string()));
            StampedRecord(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ParsedRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_stamp_adds_date_to_every_record() {
        let stamped = stamp_records(
            vec![
                record(json!({"station": "Alpha", "mm": 12.5})),
                record(json!({"station": "Beta", "mm": 0})),
            ],
            "15/01/2024",
        );

        assert_eq!(stamped.len(), 2);
        assert!(stamped.iter().all(|r| r.date() == Some("15/01/2024")));
        assert_eq!(stamped[0].fields()["station"], "Alpha");
    }

    #[test]
    fn test_stamp_overwrites_existing_date_in_place() {
        let stamped = stamp_records(
            vec![record(json!({"date": "01/01/1999", "station": "Alpha"}))],
            "15/01/2024",
        );

        let columns: Vec<&str> = stamped[0].fields().keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["date", "station"]);
        assert_eq!(stamped[0].date(), Some("15/01/2024"));
    }

    #[test]
    fn test_stamp_appends_date_last() {
        let stamped = stamp_records(vec![record(json!({"station": "A", "mm": 1}))], "d");
        let columns: Vec<&str> = stamped[0].fields().keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["station", "mm", "date"]);
    }

    #[test]
    fn test_stamp_keeps_date_verbatim() {
        let stamped = stamp_records(vec![ParsedRecord::new()], " 2024-1-15 (provisional) ");
        assert_eq!(stamped[0].date(), Some(" 2024-1-15 (provisional) "));
    }

    #[test]
    fn test_stamp_empty_batch() {
        assert!(stamp_records(Vec::new(), "15/01/2024").is_empty());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let stamped = stamp_records(vec![record(json!({"station": "A"}))], "15/01/2024");
        assert_eq!(
            serde_json::to_value(&stamped[0]).unwrap(),
            json!({"station": "A", "date": "15/01/2024"})
        );
    }
}
