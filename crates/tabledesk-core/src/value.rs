//! Runtime values and rows.
//!
//! Every table is handled through the same representation: a `Row` maps
//! column names to `Value`s and a `RowKey` holds the primary-key subset of a
//! row. Values coming from callers are loosely typed (form fields, JSON) and
//! are coerced to the column's `ColumnType` before they reach the backend.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::catalog::ColumnType;

/// Canonical text form of timestamps, matching SQLite's `CURRENT_TIMESTAMP`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean, stored as 0/1.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// Floating point number.
    Decimal(f64),
    /// UTF-8 text.
    Text(String),
    /// Date and time without zone (UTC by convention).
    Timestamp(NaiveDateTime),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the runtime type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Blob(_) => "blob",
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Coerce this value to the given column type.
    ///
    /// Null passes through untouched; nullability is the validator's concern.
    pub fn coerce(self, ty: ColumnType) -> Result<Value, String> {
        match (ty, self) {
            (_, Value::Null) => Ok(Value::Null),

            (ColumnType::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (ColumnType::Integer, Value::Bool(b)) => Ok(Value::Integer(b as i64)),
            (ColumnType::Integer, Value::Decimal(f)) => {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Ok(Value::Integer(f as i64))
                } else {
                    Err(format!("{} is not a whole number", f))
                }
            }
            (ColumnType::Integer, Value::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("'{}' is not an integer", s)),

            (ColumnType::Decimal, Value::Decimal(f)) => Ok(Value::Decimal(f)),
            (ColumnType::Decimal, Value::Integer(i)) => Ok(Value::Decimal(i as f64)),
            (ColumnType::Decimal, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Decimal(f)),
                _ => Err(format!("'{}' is not a number", s)),
            },

            (ColumnType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ColumnType::Boolean, Value::Integer(0)) => Ok(Value::Bool(false)),
            (ColumnType::Boolean, Value::Integer(1)) => Ok(Value::Bool(true)),
            (ColumnType::Boolean, Value::Text(s)) => {
                parse_bool(&s).ok_or_else(|| format!("'{}' is not a boolean", s))
            }

            (ColumnType::Timestamp, Value::Timestamp(t)) => Ok(Value::Timestamp(t)),
            (ColumnType::Timestamp, Value::Text(s)) => parse_timestamp(&s)
                .map(Value::Timestamp)
                .ok_or_else(|| format!("'{}' is not a timestamp", s)),
            (ColumnType::Timestamp, Value::Integer(secs)) => DateTime::from_timestamp(secs, 0)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .ok_or_else(|| format!("{} is out of the timestamp range", secs)),

            (ColumnType::Text, Value::Text(s)) => Ok(Value::Text(s)),
            (ColumnType::Text, Value::Integer(i)) => Ok(Value::Text(i.to_string())),
            (ColumnType::Text, Value::Decimal(f)) => Ok(Value::Text(f.to_string())),
            (ColumnType::Text, Value::Bool(b)) => Ok(Value::Text(b.to_string())),
            (ColumnType::Text, Value::Timestamp(t)) => {
                Ok(Value::Text(t.format(TIMESTAMP_FORMAT).to_string()))
            }
            (ColumnType::Text, Value::Blob(b)) => {
                String::from_utf8(b).map(Value::Text).map_err(|_| "blob is not valid UTF-8".into())
            }

            (ColumnType::Blob, Value::Blob(b)) => Ok(Value::Blob(b)),
            (ColumnType::Blob, Value::Text(s)) => Ok(Value::Blob(s.into_bytes())),

            (ty, other) => Err(format!("cannot use {} as {}", other.type_name(), ty)),
        }
    }

    /// Read a backend value, interpreting it through the column type.
    pub fn from_sql(raw: ValueRef<'_>, ty: ColumnType) -> Value {
        match raw {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => match ty {
                ColumnType::Boolean => Value::Bool(i != 0),
                ColumnType::Decimal => Value::Decimal(i as f64),
                ColumnType::Timestamp => DateTime::from_timestamp(i, 0)
                    .map(|dt| Value::Timestamp(dt.naive_utc()))
                    .unwrap_or(Value::Integer(i)),
                _ => Value::Integer(i),
            },
            ValueRef::Real(f) => Value::Decimal(f),
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                match ty {
                    ColumnType::Timestamp => parse_timestamp(&text)
                        .map(Value::Timestamp)
                        .unwrap_or(Value::Text(text)),
                    ColumnType::Boolean => parse_bool(&text).unwrap_or(Value::Text(text)),
                    _ => Value::Text(text),
                }
            }
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Decimal(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(t) => {
                serde_json::Value::String(t.format(TIMESTAMP_FORMAT).to_string())
            }
            Value::Blob(b) => serde_json::Value::String(hex::encode(b)),
        }
    }

    /// Build an untyped value from JSON. Nested arrays and objects are rejected.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, String> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Integer(i)),
                None => n
                    .as_f64()
                    .map(Value::Decimal)
                    .ok_or_else(|| format!("unsupported number {}", n)),
            },
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Array(_) => Err("arrays are not column values".into()),
            serde_json::Value::Object(_) => Err("objects are not column values".into()),
        }
    }
}

fn parse_bool(s: &str) -> Option<Value> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(Value::Bool(true)),
        "false" | "f" | "no" | "n" | "0" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// Parse the timestamp spellings callers commonly send.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(*b as i64)),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Decimal(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(t) => {
                ToSqlOutput::Owned(t.format(TIMESTAMP_FORMAT).to_string().into())
            }
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_FORMAT)),
            Value::Blob(b) => write!(f, "x'{}'", hex::encode(b)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&json).map_err(serde::de::Error::custom)
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column assignment.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Set a column value, returning the previous one.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(column.into(), value)
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Check whether the row carries a column.
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Column names in the row.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Extract the key of this row. `None` if a key column is missing or null.
    pub fn key(&self, key_columns: &[String]) -> Option<RowKey> {
        let mut key = RowKey::new();
        for column in key_columns {
            match self.values.get(column) {
                Some(v) if !v.is_null() => key.0.insert(column.clone(), v.clone()),
                _ => return None,
            };
        }
        Some(key)
    }

    /// JSON object image of the row, as captured in audit records.
    pub fn to_image(&self) -> serde_json::Map<String, serde_json::Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    /// Build a row from a JSON object.
    pub fn from_json_object(
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Row, String> {
        object
            .iter()
            .map(|(k, v)| {
                Value::from_json(v)
                    .map(|value| (k.clone(), value))
                    .map_err(|e| format!("{}: {}", k, e))
            })
            .collect()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Primary-key values identifying one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(BTreeMap<String, Value>);

impl RowKey {
    /// Create an empty key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style key column assignment.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Get a key column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Key column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of key columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON object form, the way keys are stored in audit records.
    pub fn to_json_string(&self) -> String {
        let object: serde_json::Map<String, serde_json::Value> =
            self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
        serde_json::Value::Object(object).to_string()
    }

    /// Parse a key from its JSON object form.
    pub fn from_json_str(text: &str) -> Result<RowKey, String> {
        let json: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        match json {
            serde_json::Value::Object(object) => {
                Row::from_json_object(&object).map(|row| RowKey(row.values))
            }
            _ => Err("a row key must be a JSON object".into()),
        }
    }

    pub(crate) fn set(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_text_inputs() {
        assert_eq!(
            Value::from("42").coerce(ColumnType::Integer),
            Ok(Value::Integer(42))
        );
        assert_eq!(
            Value::from(" 2.5 ").coerce(ColumnType::Decimal),
            Ok(Value::Decimal(2.5))
        );
        assert_eq!(
            Value::from("Yes").coerce(ColumnType::Boolean),
            Ok(Value::Bool(true))
        );
        assert!(Value::from("forty").coerce(ColumnType::Integer).is_err());
        assert!(Value::from("NaN").coerce(ColumnType::Decimal).is_err());
        assert!(Value::from(2).coerce(ColumnType::Boolean).is_err());
    }

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(
            Value::Decimal(3.0).coerce(ColumnType::Integer),
            Ok(Value::Integer(3))
        );
        assert!(Value::Decimal(3.5).coerce(ColumnType::Integer).is_err());
        assert_eq!(
            Value::Integer(7).coerce(ColumnType::Text),
            Ok(Value::Text("7".into()))
        );
        assert_eq!(Value::Null.coerce(ColumnType::Integer), Ok(Value::Null));
    }

    #[test]
    fn test_coerce_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();

        for text in [
            "2024-03-01 12:30:00",
            "2024-03-01T12:30:00",
            "2024-03-01T12:30:00Z",
            "2024-03-01T14:30:00+02:00",
        ] {
            assert_eq!(
                Value::from(text).coerce(ColumnType::Timestamp),
                Ok(Value::Timestamp(expected)),
                "parsing {}",
                text
            );
        }

        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            Value::from("2024-03-01").coerce(ColumnType::Timestamp),
            Ok(Value::Timestamp(midnight))
        );
    }

    #[test]
    fn test_from_sql_uses_column_type() {
        assert_eq!(
            Value::from_sql(ValueRef::Integer(1), ColumnType::Boolean),
            Value::Bool(true)
        );
        assert_eq!(
            Value::from_sql(ValueRef::Integer(5), ColumnType::Decimal),
            Value::Decimal(5.0)
        );
        assert_eq!(
            Value::from_sql(ValueRef::Text(b"hello"), ColumnType::Timestamp),
            Value::Text("hello".into())
        );
    }

    #[test]
    fn test_row_key_extraction() {
        let row = Row::new().with("id", 3).with("name", "x");
        let key = row.key(&["id".to_string()]).unwrap();
        assert_eq!(key.to_json_string(), r#"{"id":3}"#);

        let row = Row::new().with("id", Value::Null);
        assert!(row.key(&["id".to_string()]).is_none());
    }

    #[test]
    fn test_row_key_json_round_trip() {
        let key = RowKey::new().with("company", "ACME").with("seq", 9);
        let text = key.to_json_string();
        assert_eq!(text, r#"{"company":"ACME","seq":9}"#);
        assert_eq!(RowKey::from_json_str(&text).unwrap(), key);
        assert!(RowKey::from_json_str("[1]").is_err());
    }

    #[test]
    fn test_row_serializes_as_plain_object() {
        let row = Row::new().with("a", 1).with("b", Value::Null).with("c", true);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"a":1,"b":null,"c":true}"#);

        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
