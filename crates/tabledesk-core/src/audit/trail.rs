//! The audit table: creation and querying.

use rusqlite::Connection;

use super::AuditRecord;
use crate::catalog::{ColumnDescriptor, TableDescriptor};
use crate::error::Result;
use crate::query::{FilterSpec, Page, PageWindow, QueryBuilder, SortSpec};
use crate::AUDIT_TABLE;

/// Create the audit table and its append-only triggers if missing.
pub fn ensure_audit_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{AUDIT_TABLE}\" (
             id        INTEGER PRIMARY KEY AUTOINCREMENT,
             \"table\"   TEXT NOT NULL,
             \"key\"     TEXT NOT NULL,
             operation TEXT NOT NULL,
             subject   TEXT NOT NULL,
             timestamp DATETIME NOT NULL,
             before    TEXT,
             after     TEXT
         );
         CREATE INDEX IF NOT EXISTS \"{AUDIT_TABLE}_by_row\"
             ON \"{AUDIT_TABLE}\" (\"table\", \"key\");
         CREATE TRIGGER IF NOT EXISTS \"{AUDIT_TABLE}_no_update\"
             BEFORE UPDATE ON \"{AUDIT_TABLE}\"
         BEGIN
             SELECT RAISE(ABORT, 'audit records are append-only');
         END;
         CREATE TRIGGER IF NOT EXISTS \"{AUDIT_TABLE}_no_delete\"
             BEFORE DELETE ON \"{AUDIT_TABLE}\"
         BEGIN
             SELECT RAISE(ABORT, 'audit records are append-only');
         END;"
    ))?;
    Ok(())
}

/// Fixed descriptor of the audit table, used to validate audit queries.
pub fn audit_descriptor() -> TableDescriptor {
    let columns = vec![
        ColumnDescriptor::new("id", "INTEGER").primary_key(1).generated(),
        ColumnDescriptor::new("table", "TEXT").not_null(),
        ColumnDescriptor::new("key", "TEXT").not_null(),
        ColumnDescriptor::new("operation", "TEXT").not_null(),
        ColumnDescriptor::new("subject", "TEXT").not_null(),
        ColumnDescriptor::new("timestamp", "DATETIME").not_null(),
        ColumnDescriptor::new("before", "TEXT"),
        ColumnDescriptor::new("after", "TEXT"),
    ];
    TableDescriptor {
        name: AUDIT_TABLE.to_string(),
        columns,
        primary_key: vec!["id".to_string()],
        foreign_keys: Vec::new(),
    }
}

/// Page through audit records matching the filters.
///
/// Filters and sort keys are validated against the audit descriptor exactly
/// as they are for user tables. Without sort keys records come in `id`
/// order.
pub fn query_audit(
    conn: &Connection,
    filters: &FilterSpec,
    sort: &SortSpec,
    window: PageWindow,
) -> Result<Page<AuditRecord>> {
    let table = audit_descriptor();
    let builder = QueryBuilder::new(&table);
    let count = builder.build_count(filters)?;
    let select = builder.build_select(filters, sort, window)?;

    let total: i64 = conn.query_row(&count.sql, count.bind(), |row| row.get(0))?;

    let mut stmt = conn.prepare(&select.sql)?;
    let rows = stmt
        .query_map(select.bind(), |row| builder.read_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let records = rows
        .iter()
        .map(AuditRecord::from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Page::new(records, total.max(0) as u64, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditOperation, AuditRecorder, TableAuditRecorder};
    use crate::value::{Row, RowKey};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_audit_table(&conn).unwrap();
        conn
    }

    fn write(conn: &mut Connection, table: &str, id: i64, op: AuditOperation) {
        let row = Row::new().with("id", id).with("name", format!("row {}", id));
        let (before, after) = match op {
            AuditOperation::Insert | AuditOperation::BulkInsert => (None, Some(&row)),
            AuditOperation::Update => (Some(&row), Some(&row)),
            _ => (Some(&row), None),
        };
        let record = AuditRecord::new(
            table,
            RowKey::new().with("id", id),
            op,
            "alice",
            before,
            after,
        );
        let tx = conn.transaction().unwrap();
        TableAuditRecorder.record(&tx, &record).unwrap();
        tx.commit().unwrap();
    }

    fn window() -> PageWindow {
        PageWindow { number: 1, size: 50 }
    }

    #[test]
    fn test_records_round_trip() {
        let mut conn = test_conn();
        write(&mut conn, "people", 1, AuditOperation::Insert);
        write(&mut conn, "people", 1, AuditOperation::Delete);

        let page = query_audit(&conn, &FilterSpec::new(), &SortSpec::new(), window()).unwrap();
        assert_eq!(page.total, 2);

        let insert = &page.items[0];
        assert_eq!(insert.operation, AuditOperation::Insert);
        assert_eq!(insert.key, RowKey::new().with("id", 1));
        assert!(insert.before.is_none());
        assert_eq!(insert.after.as_ref().unwrap()["name"], "row 1");

        let delete = &page.items[1];
        assert!(delete.id > insert.id);
        assert!(delete.after.is_none());
    }

    #[test]
    fn test_filter_by_table_and_key() {
        let mut conn = test_conn();
        write(&mut conn, "people", 1, AuditOperation::Insert);
        write(&mut conn, "people", 2, AuditOperation::Insert);
        write(&mut conn, "pets", 1, AuditOperation::Insert);

        let filters = FilterSpec::new()
            .eq("table", "people")
            .eq("key", RowKey::new().with("id", 2).to_json_string());
        let page = query_audit(&conn, &filters, &SortSpec::new(), window()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].key, RowKey::new().with("id", 2));

        let filters = FilterSpec::new().eq("nonsense", 1);
        assert!(query_audit(&conn, &filters, &SortSpec::new(), window()).is_err());
    }

    #[test]
    fn test_audit_table_is_append_only() {
        let mut conn = test_conn();
        write(&mut conn, "people", 1, AuditOperation::Insert);

        let update = conn.execute(
            &format!("UPDATE \"{AUDIT_TABLE}\" SET subject = 'mallory'"),
            [],
        );
        assert!(update.is_err());
        let delete = conn.execute(&format!("DELETE FROM \"{AUDIT_TABLE}\""), []);
        assert!(delete.is_err());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let conn = test_conn();
        ensure_audit_table(&conn).unwrap();
    }
}
