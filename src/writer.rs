use serde_json::Value;
use tracing::info;

use crate::db::{RegulationRow, Store, StoreConfig, WriteReport};
use crate::error::StoreError;
use crate::validate::{parse_flag, Record};

/// Persists validated records, opening its own connection for each call.
pub struct Writer {
    config: StoreConfig,
}

impl Writer {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn write(&self, records: &[Record]) -> Result<WriteReport, StoreError> {
        let store = Store::open(&self.config)?;
        store.init_schema()?;
        write_records(&store, records)
    }
}

/// Map records onto regulation rows and insert them idempotently.
pub fn write_records(store: &Store, records: &[Record]) -> Result<WriteReport, StoreError> {
    let entity = &store.config().entity;
    let rows = records
        .iter()
        .enumerate()
        .map(|(i, r)| to_row(i, r, entity))
        .collect::<Result<Vec<_>, _>>()?;

    info!(rows = rows.len(), "Writing regulations");
    store.insert_regulations(&rows)
}

fn to_row(index: usize, record: &Record, default_entity: &str) -> Result<RegulationRow, StoreError> {
    let required = |field: &'static str| {
        text(record, field)
            .filter(|s| !s.is_empty())
            .ok_or(StoreError::MissingField { index, field })
    };

    Ok(RegulationRow {
        title: required("title")?,
        created_at: required("created_at")?,
        update_at: text(record, "update_at"),
        is_active: flag(record, "is_active")
            .ok_or(StoreError::MissingField { index, field: "is_active" })?
            .unwrap_or(true),
        gtype: text(record, "gtype"),
        entity: text(record, "entity").or_else(|| Some(default_entity.to_string())),
        external_link: text(record, "external_link"),
        rtype_id: integer(record, "rtype_id"),
        summary: text(record, "summary"),
        classification_id: integer(record, "classification_id"),
    })
}

fn text(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn integer(record: &Record, field: &str) -> Option<i64> {
    match record.get(field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `Some(None)` when the column is absent or null, `None` when it holds no readable flag.
fn flag(record: &Record, field: &str) -> Option<Option<bool>> {
    match record.get(field) {
        None | Some(Value::Null) => Some(None),
        Some(Value::Bool(b)) => Some(Some(*b)),
        Some(Value::Number(n)) => n.as_i64().map(|n| Some(n != 0)),
        Some(Value::String(s)) if s.trim().is_empty() => Some(None),
        Some(Value::String(s)) => parse_flag(s).map(Some),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::testing::memory_store;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn batch() -> Vec<Record> {
        vec![
            record(json!({
                "title": " Decreto X ", "created_at": "2024-01-01",
                "external_link": "https://www.ani.gov.co/x", "rtype_id": 14,
                "classification_id": 13, "is_active": true
            })),
            record(json!({
                "title": "Resolución 7", "created_at": "2024-01-02",
                "external_link": null, "rtype_id": "15"
            })),
        ]
    }

    #[test]
    fn rewriting_the_same_batch_is_a_no_op() {
        let store = memory_store();
        let first = write_records(&store, &batch()).unwrap();
        assert_eq!(first.inserted_count, 2);
        assert_eq!(first.components_written, 2);

        let second = write_records(&store, &batch()).unwrap();
        assert_eq!(second.inserted_count, 0);
        assert_eq!(second.duplicate_count, 2);
        assert_eq!(second.components_written, 0);
    }

    #[test]
    fn titles_are_trimmed_before_keying() {
        let store = memory_store();
        write_records(&store, &batch()).unwrap();
        let again = record(json!({
            "title": "Decreto X", "created_at": "2024-01-01",
            "external_link": "https://www.ani.gov.co/x"
        }));
        let report = write_records(&store, &[again]).unwrap();
        assert_eq!(report.duplicate_count, 1);
    }

    #[test]
    fn defaults_fill_missing_columns() {
        let row = to_row(0, &batch()[1], "Entidad").unwrap();
        assert!(row.is_active);
        assert_eq!(row.entity.as_deref(), Some("Entidad"));
        assert_eq!(row.rtype_id, Some(15));
        assert_eq!(row.external_link, None);
    }

    #[test]
    fn empty_link_is_kept_as_empty() {
        let r = record(json!({"title": "A", "created_at": "2024-01-01", "external_link": ""}));
        assert_eq!(to_row(0, &r, "E").unwrap().external_link.as_deref(), Some(""));
    }

    #[test]
    fn textual_flags_are_honoured() {
        let inactive = record(json!({"title": "A", "created_at": "2024-01-01", "is_active": "false"}));
        assert!(!to_row(0, &inactive, "E").unwrap().is_active);

        let active = record(json!({"title": "A", "created_at": "2024-01-01", "is_active": "Sí"}));
        assert!(to_row(0, &active, "E").unwrap().is_active);

        let blank = record(json!({"title": "A", "created_at": "2024-01-01", "is_active": " "}));
        assert!(to_row(0, &blank, "E").unwrap().is_active);
    }

    #[test]
    fn unreadable_flag_is_an_error() {
        let r = record(json!({"title": "A", "created_at": "2024-01-01", "is_active": "maybe"}));
        let err = write_records(&memory_store(), &[r]).unwrap_err();
        assert!(matches!(err, StoreError::MissingField { index: 0, field: "is_active" }));
    }

    #[test]
    fn missing_title_is_an_error() {
        let r = record(json!({"created_at": "2024-01-01"}));
        let err = write_records(&memory_store(), &[r]).unwrap_err();
        assert!(matches!(err, StoreError::MissingField { index: 0, field: "title" }));
    }

    #[test]
    fn writer_opens_its_own_database() {
        let dir = std::env::temp_dir().join(format!("ani_writer_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let config = crate::db::StoreConfig {
            db_path: dir.join("ani.sqlite"),
            ..crate::db::testing::config()
        };
        let writer = Writer::new(config.clone());
        assert_eq!(writer.write(&batch()).unwrap().inserted_count, 2);
        assert_eq!(writer.write(&batch()).unwrap().duplicate_count, 2);

        let store = Store::open(&config).unwrap();
        assert_eq!(store.stats().unwrap().regulations, 2);
        drop(store);
        let _ = std::fs::remove_dir_all(dir);
    }
}
