use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, info, warn};

use crate::rules::{FieldType, Rule, RuleSet};

/// A scraped or validated row: column name to scalar value.
pub type Record = serde_json::Map<String, Value>;

const TRUTHY: &[&str] = &["true", "1", "t", "yes", "si", "sí"];
const FALSY: &[&str] = &["false", "0", "f", "no"];

/// What happens to a row when a non-required cell fails its checks.
/// Failures on required fields always discard the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidCellPolicy {
    #[default]
    DiscardRow,
    NullCell,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub rows_received: usize,
    pub rows_discarded: usize,
    pub rows_valid: usize,
    /// Failed checks per field, across the whole batch.
    pub invalid_cells: BTreeMap<String, usize>,
}

/// Boolean from its textual spelling, case-insensitive. `None` when the text is neither.
pub fn parse_flag(text: &str) -> Option<bool> {
    let text = text.trim().to_lowercase();
    if TRUTHY.contains(&text.as_str()) {
        Some(true)
    } else if FALSY.contains(&text.as_str()) {
        Some(false)
    } else {
        None
    }
}

impl ValidationStats {
    pub fn total_invalid_cells(&self) -> usize {
        self.invalid_cells.values().sum()
    }
}

pub struct Validation {
    pub accepted: Vec<Record>,
    pub stats: ValidationStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Missing,
    Type(FieldType),
    Pattern,
    Length(usize),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Missing => write!(f, "required value missing"),
            Failure::Type(t) => write!(f, "not a valid {:?}", t),
            Failure::Pattern => write!(f, "does not match pattern"),
            Failure::Length(max) => write!(f, "longer than {} characters", max),
        }
    }
}

enum Cell {
    Empty,
    Valid(Value),
    Invalid(Failure),
}

/// Check every record against `rules`, coercing accepted values to their declared
/// type. Record order is preserved; fields without a rule pass through untouched.
pub fn validate(records: Vec<Record>, rules: &RuleSet, policy: InvalidCellPolicy) -> Validation {
    let mut stats = ValidationStats {
        rows_received: records.len(),
        ..Default::default()
    };
    let mut accepted = Vec::with_capacity(records.len());
    if rules.is_empty() {
        warn!("Rule set is empty, every record passes");
    }

    'rows: for (row, mut record) in records.into_iter().enumerate() {
        for (field, rule) in rules.iter() {
            let failure = match check_cell(record.get(field), rule) {
                Cell::Valid(value) => {
                    record.insert(field.to_string(), value);
                    continue;
                }
                Cell::Empty if !rule.required => {
                    if let Some(v) = record.get_mut(field) {
                        *v = Value::Null;
                    }
                    continue;
                }
                Cell::Empty => Failure::Missing,
                Cell::Invalid(failure) => failure,
            };

            *stats.invalid_cells.entry(field.to_string()).or_default() += 1;

            if rule.required || policy == InvalidCellPolicy::DiscardRow {
                debug!(row, field, reason = %failure, "Row discarded");
                stats.rows_discarded += 1;
                continue 'rows;
            }

            debug!(row, field, reason = %failure, "Cell nulled");
            record.insert(field.to_string(), Value::Null);
        }
        accepted.push(record);
    }

    stats.rows_valid = accepted.len();
    info!(
        received = stats.rows_received,
        discarded = stats.rows_discarded,
        valid = stats.rows_valid,
        invalid_cells = stats.total_invalid_cells(),
        "Validation finished"
    );

    Validation { accepted, stats }
}

fn check_cell(value: Option<&Value>, rule: &Rule) -> Cell {
    let Some(value) = value.filter(|v| !is_blank(v)) else {
        return Cell::Empty;
    };

    let value = match rule.field_type {
        Some(t) => match coerce(value, t) {
            Some(v) => v,
            None => return Cell::Invalid(Failure::Type(t)),
        },
        None => value.clone(),
    };

    if let Some(re) = &rule.pattern {
        if !re.is_match(&as_text(&value)) {
            return Cell::Invalid(Failure::Pattern);
        }
    }

    if let (Some(max), Value::String(s)) = (rule.max_length, &value) {
        if s.chars().count() > max {
            return Cell::Invalid(Failure::Length(max));
        }
    }

    Cell::Valid(value)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce(value: &Value, to: FieldType) -> Option<Value> {
    match to {
        FieldType::String => match value {
            Value::String(s) => Some(Value::String(s.trim().to_string())),
            Value::Number(_) | Value::Bool(_) => Some(Value::String(value.to_string())),
            _ => None,
        },
        FieldType::Integer => match value {
            Value::Number(n) => n.as_i64().map(Value::from),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        FieldType::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            Number::from_f64(f).map(Value::Number)
        }
        FieldType::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(_) | Value::Number(_) => parse_flag(&as_text(value)).map(Value::Bool),
            _ => None,
        },
        FieldType::Date => match value {
            Value::String(s) => parse_date(s.trim())
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            _ => None,
        },
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn rules(v: Value) -> RuleSet {
        RuleSet::from_json(&v.to_string()).unwrap()
    }

    fn title_and_date() -> RuleSet {
        rules(json!({"fields": {
            "title": {"type": "string", "required": true},
            "created_at": {"type": "date", "required": true}
        }}))
    }

    #[test]
    fn decreto_is_accepted() {
        let out = validate(
            vec![record(json!({"title": "Decreto X", "created_at": "2024-01-01"}))],
            &title_and_date(),
            InvalidCellPolicy::DiscardRow,
        );
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.stats.rows_discarded, 0);
        assert_eq!(out.stats.rows_valid, 1);
    }

    #[test]
    fn empty_required_title_discards() {
        let out = validate(
            vec![record(json!({"title": "", "created_at": "2024-01-01"}))],
            &title_and_date(),
            InvalidCellPolicy::DiscardRow,
        );
        assert!(out.accepted.is_empty());
        assert_eq!(out.stats.rows_discarded, 1);
        assert_eq!(out.stats.invalid_cells.get("title"), Some(&1));
    }

    #[test]
    fn missing_required_discards_even_with_null_cell_policy() {
        let out = validate(
            vec![record(json!({"title": "Resolución 1"}))],
            &title_and_date(),
            InvalidCellPolicy::NullCell,
        );
        assert!(out.accepted.is_empty());
        assert_eq!(out.stats.rows_discarded, 1);
    }

    #[test]
    fn flag_spellings() {
        assert_eq!(parse_flag(" SÍ "), Some(true));
        assert_eq!(parse_flag("t"), Some(true));
        assert_eq!(parse_flag("No"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn stops_at_first_failing_field() {
        // created_at sorts before title; title is never looked at
        let out = validate(
            vec![record(json!({"title": "", "created_at": "yesterday"}))],
            &title_and_date(),
            InvalidCellPolicy::DiscardRow,
        );
        assert_eq!(out.stats.rows_discarded, 1);
        assert_eq!(out.stats.invalid_cells.get("created_at"), Some(&1));
        assert_eq!(out.stats.invalid_cells.get("title"), None);
    }

    #[test]
    fn coerces_declared_types() {
        let rs = rules(json!({"fields": {
            "title": {"type": "string"},
            "created_at": {"type": "date"},
            "rtype_id": {"type": "integer"},
            "score": {"type": "float"},
            "is_active": {"type": "boolean"}
        }}));
        let out = validate(
            vec![record(json!({
                "title": "  Decreto 5  ",
                "created_at": "2024-02-03 10:11:12",
                "rtype_id": " 14 ",
                "score": "2.5",
                "is_active": "Sí"
            }))],
            &rs,
            InvalidCellPolicy::DiscardRow,
        );
        let r = &out.accepted[0];
        assert_eq!(r["title"], json!("Decreto 5"));
        assert_eq!(r["created_at"], json!("2024-02-03"));
        assert_eq!(r["rtype_id"], json!(14));
        assert_eq!(r["score"], json!(2.5));
        assert_eq!(r["is_active"], json!(true));
    }

    #[test]
    fn invalid_optional_cell_discards_by_default() {
        let rs = rules(json!({"fields": {
            "title": {"type": "string", "required": true},
            "rtype_id": {"type": "integer"}
        }}));
        let input = vec![record(json!({"title": "Decreto 1", "rtype_id": "catorce"}))];

        let discard = validate(input.clone(), &rs, InvalidCellPolicy::DiscardRow);
        assert!(discard.accepted.is_empty());
        assert_eq!(discard.stats.rows_discarded, 1);

        let nulled = validate(input, &rs, InvalidCellPolicy::NullCell);
        assert_eq!(nulled.accepted.len(), 1);
        assert_eq!(nulled.accepted[0]["rtype_id"], Value::Null);
        assert_eq!(nulled.stats.rows_discarded, 0);
        assert_eq!(nulled.stats.invalid_cells.get("rtype_id"), Some(&1));
    }

    #[test]
    fn absent_optional_value_is_not_a_failure() {
        let out = validate(
            vec![record(json!({"title": "Circular 2", "summary": "   "}))],
            &rules(json!({"fields": {
                "title": {"type": "string", "required": true},
                "summary": {"type": "string"}
            }})),
            InvalidCellPolicy::DiscardRow,
        );
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.accepted[0]["summary"], Value::Null);
        assert_eq!(out.stats.total_invalid_cells(), 0);
    }

    #[test]
    fn regex_and_length_limits() {
        let rs = rules(json!({"fields": {
            "external_link": {"type": "string", "regex": "https?://.+", "required": true},
            "title": {"type": "string", "max_length": 10, "required": true}
        }}));
        let out = validate(
            vec![
                record(json!({"title": "corto", "external_link": "https://a.co/x"})),
                record(json!({"title": "corto", "external_link": "ftp://a.co/x"})),
                record(json!({"title": "demasiado largo", "external_link": "https://a.co/x"})),
            ],
            &rs,
            InvalidCellPolicy::DiscardRow,
        );
        assert_eq!(out.stats.rows_valid, 1);
        assert_eq!(out.stats.rows_discarded, 2);
        assert_eq!(out.stats.invalid_cells.get("external_link"), Some(&1));
        assert_eq!(out.stats.invalid_cells.get("title"), Some(&1));
    }

    #[test]
    fn max_length_ignores_non_strings() {
        let rs = rules(json!({"fields": {"rtype_id": {"type": "integer", "max_length": 1}}}));
        let out = validate(
            vec![record(json!({"rtype_id": 1500}))],
            &rs,
            InvalidCellPolicy::DiscardRow,
        );
        assert_eq!(out.accepted.len(), 1);
    }

    #[test]
    fn unknown_fields_pass_through_in_order() {
        let out = validate(
            vec![
                record(json!({"title": "A", "created_at": "2024-01-01", "gtype": "link"})),
                record(json!({"title": "B", "created_at": "2024-01-02"})),
            ],
            &title_and_date(),
            InvalidCellPolicy::DiscardRow,
        );
        assert_eq!(out.accepted[0]["title"], json!("A"));
        assert_eq!(out.accepted[0]["gtype"], json!("link"));
        assert_eq!(out.accepted[1]["title"], json!("B"));
    }

    #[test]
    fn booleans_reject_other_words() {
        assert_eq!(coerce(&json!("quizás"), FieldType::Boolean), None);
        assert_eq!(coerce(&json!(0), FieldType::Boolean), Some(json!(false)));
        assert_eq!(coerce(&json!("NO"), FieldType::Boolean), Some(json!(false)));
    }

    #[test]
    fn integers_are_strict() {
        assert_eq!(coerce(&json!("13.0"), FieldType::Integer), None);
        assert_eq!(coerce(&json!(13.5), FieldType::Integer), None);
        assert_eq!(coerce(&json!(true), FieldType::Integer), None);
    }

    #[test]
    fn empty_batch() {
        let out = validate(Vec::new(), &title_and_date(), InvalidCellPolicy::DiscardRow);
        assert_eq!(out.stats, ValidationStats::default());
    }
}
