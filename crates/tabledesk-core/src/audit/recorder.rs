//! Audit recorders.

use rusqlite::{params, Transaction};
use tracing::debug;

use super::{AuditImage, AuditRecord};
use crate::error::{Error, Result};
use crate::value::Value;
use crate::AUDIT_TABLE;

/// Persists audit records inside the caller's transaction.
///
/// A failing `record` makes the whole mutation fail; the caller's
/// transaction is then dropped and rolls the data change back.
pub trait AuditRecorder: Send + Sync {
    /// Write one record within `tx`.
    fn record(&self, tx: &Transaction<'_>, record: &AuditRecord) -> Result<()>;
}

/// Recorder writing to the reserved audit table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableAuditRecorder;

impl TableAuditRecorder {
    /// Create a table recorder.
    pub fn new() -> Self {
        Self
    }
}

impl AuditRecorder for TableAuditRecorder {
    fn record(&self, tx: &Transaction<'_>, record: &AuditRecord) -> Result<()> {
        tx.execute(
            &format!(
                "INSERT INTO \"{AUDIT_TABLE}\" \
                 (\"table\", \"key\", operation, subject, timestamp, before, after) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                record.table,
                record.key.to_json_string(),
                record.operation.as_str(),
                record.subject,
                Value::Timestamp(record.timestamp),
                image_text(record.before.as_ref())?,
                image_text(record.after.as_ref())?,
            ],
        )?;
        debug!(
            table = %record.table,
            key = %record.key,
            operation = %record.operation,
            "Audit record written"
        );
        Ok(())
    }
}

fn image_text(image: Option<&AuditImage>) -> Result<Option<String>> {
    image
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Connection(format!("cannot encode audit image: {}", e)))
}
