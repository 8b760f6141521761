//! Audit record types.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::value::{Row, RowKey, Value};
use crate::AUDIT_TABLE;

/// A row image as captured in an audit record.
pub type AuditImage = serde_json::Map<String, serde_json::Value>;

/// Kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Single-row insert.
    Insert,
    /// Single-row update.
    Update,
    /// Single-row delete.
    Delete,
    /// One row of a bulk insert.
    BulkInsert,
    /// One row of a bulk delete.
    BulkDelete,
}

impl AuditOperation {
    /// Stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Insert => "insert",
            AuditOperation::Update => "update",
            AuditOperation::Delete => "delete",
            AuditOperation::BulkInsert => "bulk_insert",
            AuditOperation::BulkDelete => "bulk_delete",
        }
    }

    /// Check if the row exists before the change.
    pub fn has_before(&self) -> bool {
        !matches!(self, AuditOperation::Insert | AuditOperation::BulkInsert)
    }

    /// Check if the row exists after the change.
    pub fn has_after(&self) -> bool {
        !matches!(self, AuditOperation::Delete | AuditOperation::BulkDelete)
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "insert" => Ok(AuditOperation::Insert),
            "update" => Ok(AuditOperation::Update),
            "delete" => Ok(AuditOperation::Delete),
            "bulk_insert" => Ok(AuditOperation::BulkInsert),
            "bulk_delete" => Ok(AuditOperation::BulkDelete),
            other => Err(corrupt(format!("unknown audit operation '{}'", other))),
        }
    }
}

/// One change to one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// Sequence number; 0 until persisted.
    pub id: i64,
    /// Mutated table.
    pub table: String,
    /// Key of the mutated row.
    pub key: RowKey,
    /// Kind of change.
    pub operation: AuditOperation,
    /// Acting subject.
    pub subject: String,
    /// When the change was made (UTC).
    pub timestamp: NaiveDateTime,
    /// Row before the change; absent for inserts.
    pub before: Option<AuditImage>,
    /// Row after the change; absent for deletes.
    pub after: Option<AuditImage>,
}

impl AuditRecord {
    /// Describe a change, stamping it with the current time. Images the
    /// operation cannot have (a before-image of an insert, an after-image of
    /// a delete) are dropped.
    pub fn new(
        table: impl Into<String>,
        key: RowKey,
        operation: AuditOperation,
        subject: impl Into<String>,
        before: Option<&Row>,
        after: Option<&Row>,
    ) -> Self {
        Self {
            id: 0,
            table: table.into(),
            key,
            operation,
            subject: subject.into(),
            timestamp: chrono::Utc::now().naive_utc(),
            before: before.filter(|_| operation.has_before()).map(Row::to_image),
            after: after.filter(|_| operation.has_after()).map(Row::to_image),
        }
    }

    /// Rebuild a record from a row of the audit table.
    pub fn from_row(row: &Row) -> Result<Self> {
        let text = |column: &str| -> Result<String> {
            match row.get(column) {
                Some(Value::Text(s)) => Ok(s.clone()),
                other => Err(corrupt(format!("column `{}` holds {:?}", column, other))),
            }
        };
        let image = |column: &str| -> Result<Option<AuditImage>> {
            match row.get(column) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::Text(s)) => match serde_json::from_str(s) {
                    Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
                    _ => Err(corrupt(format!("column `{}` is not a JSON object", column))),
                },
                Some(other) => Err(corrupt(format!("column `{}` holds {:?}", column, other))),
            }
        };

        let id = row
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| corrupt("missing id".to_string()))?;
        let timestamp = match row.get("timestamp") {
            Some(Value::Timestamp(t)) => *t,
            other => return Err(corrupt(format!("bad timestamp {:?}", other))),
        };

        Ok(Self {
            id,
            table: text("table")?,
            key: RowKey::from_json_str(&text("key")?).map_err(corrupt)?,
            operation: text("operation")?.parse()?,
            subject: text("subject")?,
            timestamp,
            before: image("before")?,
            after: image("after")?,
        })
    }
}

fn corrupt(reason: String) -> Error {
    Error::Introspection {
        table: AUDIT_TABLE.to_string(),
        reason,
    }
}
