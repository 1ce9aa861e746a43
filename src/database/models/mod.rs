pub mod column;
pub mod review;
pub mod tour;
pub mod user;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::error::ApiError;
pub use column::{Column, ColumnType, Schema};
pub use review::Review;
pub use tour::Tour;
pub use user::{Role, User};

/// Field values keyed by API field name
pub type Document = Map<String, Value>;

/// Per-field validation messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure; the first message per field wins
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// `Invalid input data. <msg>. <msg>`
    pub fn summary(&self) -> String {
        let messages: Vec<&str> = self.fields.values().map(String::as_str).collect();
        format!("Invalid input data. {}", messages.join(". "))
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    pub fn finish<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// A persisted resource served by the generic CRUD handlers.
///
/// Reads go through `base_filter`; writes run `validate`, `prepare`, the SQL
/// statement and `after_write` inside one transaction.
#[async_trait]
pub trait Model: Send + Sync + 'static {
    fn schema() -> &'static Schema;

    /// Condition every read must satisfy (soft deletes, secret records)
    fn base_filter() -> Option<Value> {
        None
    }

    fn default_sort() -> Option<&'static str> {
        Some("-createdAt")
    }

    /// Check a client body and return the values to store.
    /// `existing` is the stored document when updating.
    fn validate(body: &Document, existing: Option<&Value>) -> Result<Document, ValidationErrors>;

    /// Derive stored values (slugs, password hashes) before the write
    async fn prepare(
        _conn: &mut PgConnection,
        _doc: &mut Document,
        _existing: Option<&Value>,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    /// Add computed fields to an output row
    fn present(_row: &mut Value) {}

    /// Replace references with the referenced records. `detail` is set for single-record reads.
    async fn populate(_pool: &PgPool, _rows: &mut [Value], _detail: bool) -> Result<(), DatabaseError> {
        Ok(())
    }

    /// Runs in the write transaction after insert, update or delete
    async fn after_write(
        _conn: &mut PgConnection,
        _before: Option<&Value>,
        _after: Option<&Value>,
    ) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Copy the client-writable fields of `body`, coerced to their column types.
/// Unknown and read-only fields are dropped.
pub fn writable_fields(schema: &Schema, body: &Document, errors: &mut ValidationErrors) -> Document {
    let mut doc = Document::new();
    for (key, value) in body {
        let Some(column) = schema.field(key).filter(|c| c.writable) else {
            continue;
        };
        match coerce(column.ty, value) {
            Ok(value) => {
                doc.insert(key.clone(), value);
            }
            Err(message) => errors.add(key, format!("Invalid {}: {}", key, message)),
        }
    }
    doc
}

/// Normalise a JSON value for a column: numeric strings become numbers,
/// dates become RFC 3339, uuids are checked, strings are trimmed.
pub fn coerce(ty: ColumnType, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(element) = ty.element() {
        let items = value.as_array().ok_or_else(|| "expected an array".to_string())?;
        return items.iter().map(|item| coerce(element, item)).collect::<Result<Vec<_>, _>>().map(Value::Array);
    }

    match ty {
        ColumnType::Text => value
            .as_str()
            .map(|s| Value::String(s.trim().to_string()))
            .ok_or_else(|| format!("expected a string, got {}", value)),
        ColumnType::Integer => match as_number(value) {
            Some(n) if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 => Ok(Value::from(n as i64)),
            _ => Err(format!("expected a whole number, got {}", value)),
        },
        ColumnType::Float => as_number(value)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("expected a number, got {}", value)),
        ColumnType::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s == "true" || s == "false" => Ok(Value::Bool(s == "true")),
            _ => Err(format!("expected a boolean, got {}", value)),
        },
        ColumnType::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .map(|ts| Value::String(ts.to_rfc3339()))
            .ok_or_else(|| format!("expected a date, got {}", value)),
        ColumnType::Uuid => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(|id| Value::String(id.to_string()))
            .ok_or_else(|| format!("expected an id, got {}", value)),
        ColumnType::Json => Ok(value.clone()),
        ColumnType::TextArray | ColumnType::TimestampArray | ColumnType::UuidArray => {
            Err("unexpected array type".to_string())
        }
    }
}

pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (UTC) or `YYYY-MM-DD`
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d,%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Value of `field` after the write: the new value if given, else the stored one
pub fn merged<'a>(doc: &'a Document, existing: Option<&'a Value>, field: &str) -> Option<&'a Value> {
    let value = match doc.get(field) {
        Some(value) => Some(value),
        None => existing.and_then(|e| e.get(field)),
    };
    value.filter(|v| !v.is_null())
}

/// Presence rule: required on create; on update only an explicit null or empty string fails
pub fn require(doc: &Document, existing: Option<&Value>, field: &str, message: &str, errors: &mut ValidationErrors) {
    let missing = |v: Option<&Value>| match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    };
    let failed = if existing.is_some() {
        doc.contains_key(field) && missing(doc.get(field))
    } else {
        missing(doc.get(field))
    };
    if failed {
        errors.add(field, message);
    }
}

/// Parse a path id, mapping malformed ids to 400
pub fn parse_id(value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::invalid_id(value))
}

/// Row id of a JSON row
pub fn row_id(row: &Value) -> Option<Uuid> {
    row.get("id").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_joins_messages() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "A tour must have a name");
        errors.add("price", "A tour must have a price");
        errors.add("name", "ignored second message");
        assert_eq!(
            errors.summary(),
            "Invalid input data. A tour must have a name. A tour must have a price"
        );
        assert_eq!(errors.into_fields().len(), 2);
    }

    #[test]
    fn coerces_query_style_strings() {
        assert_eq!(coerce(ColumnType::Integer, &json!("5")), Ok(json!(5)));
        assert_eq!(coerce(ColumnType::Float, &json!("397.5")), Ok(json!(397.5)));
        assert_eq!(coerce(ColumnType::Boolean, &json!("true")), Ok(json!(true)));
        assert_eq!(coerce(ColumnType::Text, &json!("  trimmed  ")), Ok(json!("trimmed")));
        assert!(coerce(ColumnType::Integer, &json!(4.5)).is_err());
        assert!(coerce(ColumnType::Float, &json!("cheap")).is_err());
        assert!(coerce(ColumnType::Uuid, &json!("5c88fa8cf4afda39709c2955")).is_err());
    }

    #[test]
    fn coerces_dates_and_arrays() {
        assert_eq!(
            coerce(ColumnType::Timestamp, &json!("2021-06-19")),
            Ok(json!("2021-06-19T00:00:00+00:00"))
        );
        assert_eq!(
            coerce(ColumnType::TimestampArray, &json!(["2021-07-20,10:00", "2021-08-18T09:00:00Z"])),
            Ok(json!(["2021-07-20T10:00:00+00:00", "2021-08-18T09:00:00+00:00"]))
        );
        assert!(coerce(ColumnType::TextArray, &json!("tour-1.jpg")).is_err());
    }

    #[test]
    fn require_differs_between_create_and_update() {
        let existing = json!({ "name": "Stored name" });
        let mut errors = ValidationErrors::new();

        require(&Document::new(), None, "name", "missing", &mut errors);
        assert_eq!(errors.get("name"), Some("missing"));

        let mut errors = ValidationErrors::new();
        require(&Document::new(), Some(&existing), "name", "missing", &mut errors);
        assert!(errors.is_empty());

        let mut body = Document::new();
        body.insert("name".into(), json!(""));
        require(&body, Some(&existing), "name", "missing", &mut errors);
        assert!(!errors.is_empty());
    }

    #[test]
    fn malformed_ids_are_bad_requests() {
        let err = parse_id("5c88fa8cf4afda39709c2955").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.message(), "Invalid id: 5c88fa8cf4afda39709c2955");
        assert!(parse_id("9f4c3a52-5c3e-4f0e-9d7c-1f2a3b4c5d6e").is_ok());
    }

    #[test]
    fn merged_prefers_new_values() {
        let mut doc = Document::new();
        doc.insert("price".into(), json!(500));
        let existing = json!({ "price": 300, "priceDiscount": 100 });
        assert_eq!(merged(&doc, Some(&existing), "price"), Some(&json!(500)));
        assert_eq!(merged(&doc, Some(&existing), "priceDiscount"), Some(&json!(100)));
        assert_eq!(merged(&doc, None, "priceDiscount"), None);
    }
}
