//! Live schema introspection.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use super::{ColumnDescriptor, TableDescriptor};
use crate::error::{Error, Result};

/// Introspect every user table of the connected database.
///
/// Engine-owned tables, SQLite internals and tables matching a blocklist
/// pattern are left out. Tables that cannot be described (no primary key)
/// are logged and skipped.
pub fn load_schema(
    conn: &Connection,
    blocklist: &[String],
) -> Result<BTreeMap<String, TableDescriptor>> {
    let mut stmt =
        conn.prepare("SELECT name, sql FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let candidates = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tables = BTreeMap::new();
    for (name, sql) in candidates {
        if crate::is_reserved_table(&name) {
            continue;
        }
        if blocklist.iter().any(|p| name.contains(p.as_str())) {
            debug!(table = %name, "Table hidden by blocklist");
            continue;
        }

        match describe(conn, &name, sql.as_deref().unwrap_or_default()) {
            Ok(table) => {
                tables.insert(name, table);
            }
            Err(Error::Introspection { table, reason }) => {
                warn!(table = %table, reason = %reason, "Skipping table");
            }
            Err(e) => return Err(e),
        }
    }

    resolve_implicit_references(&mut tables);
    Ok(tables)
}

/// Introspect a single table by name.
pub fn introspect_table(conn: &Connection, name: &str) -> Result<TableDescriptor> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::UnknownTable(name.to_string()),
            other => other.into(),
        })?;
    describe(conn, name, sql.as_deref().unwrap_or_default())
}

fn describe(conn: &Connection, name: &str, create_sql: &str) -> Result<TableDescriptor> {
    let create_upper = create_sql.to_ascii_uppercase();
    let without_rowid = create_upper.contains("WITHOUT ROWID");
    let autoincrement = create_upper.contains("AUTOINCREMENT");

    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value IS NOT NULL, pk \
         FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let raw = stmt
        .query_map(params![name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let key_count = raw.iter().filter(|(.., pk)| *pk > 0).count();

    let columns = raw
        .into_iter()
        .map(|(column, declared, not_null, has_default, pk)| {
            let mut descriptor = ColumnDescriptor::new(column, declared);
            if not_null {
                descriptor = descriptor.not_null();
            }
            if has_default {
                descriptor = descriptor.with_default();
            }
            if pk > 0 {
                descriptor = descriptor.primary_key(pk as usize);
                // A lone INTEGER key aliases the rowid and is assigned by the backend.
                let rowid_alias = key_count == 1
                    && !without_rowid
                    && descriptor.declared_type.trim().eq_ignore_ascii_case("INTEGER");
                if rowid_alias || (key_count == 1 && autoincrement) {
                    descriptor = descriptor.generated();
                }
            }
            descriptor
        })
        .collect();

    let mut table = TableDescriptor::new(name, columns)?;

    let mut stmt = conn.prepare(
        "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )?;
    let refs = stmt
        .query_map(params![name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (column, ref_table, ref_column) in refs {
        table = table.with_foreign_key(column, ref_table, ref_column.unwrap_or_default());
    }

    debug!(
        table = %name,
        columns = table.columns.len(),
        key = ?table.primary_key,
        "Introspected table"
    );
    Ok(table)
}

/// Fill in references written as `REFERENCES parent` without a column,
/// which point at the parent's primary key.
fn resolve_implicit_references(tables: &mut BTreeMap<String, TableDescriptor>) {
    let keys: BTreeMap<String, String> = tables
        .values()
        .filter(|t| t.primary_key.len() == 1)
        .map(|t| (t.name.clone(), t.primary_key[0].clone()))
        .collect();

    for table in tables.values_mut() {
        for fk in table.foreign_keys.iter_mut().filter(|fk| fk.ref_column.is_empty()) {
            if let Some(key) = keys.get(&fk.ref_table) {
                fk.ref_column = key.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE customers (
                 id INTEGER PRIMARY KEY,
                 name TEXT NOT NULL,
                 vip BOOLEAN NOT NULL DEFAULT 0
             );
             CREATE TABLE orders (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 customer_id INTEGER NOT NULL REFERENCES customers,
                 total REAL,
                 created_at DATETIME DEFAULT CURRENT_TIMESTAMP
             );
             CREATE TABLE order_lines (
                 order_id INTEGER NOT NULL REFERENCES orders(id),
                 line INTEGER NOT NULL,
                 sku TEXT NOT NULL,
                 PRIMARY KEY (order_id, line)
             );
             CREATE TABLE codes (code INTEGER PRIMARY KEY, label TEXT) WITHOUT ROWID;
             CREATE TABLE event_log (message TEXT);
             CREATE TABLE tmp_scratch (id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_load_schema_skips_keyless_and_blocked_tables() {
        let conn = test_conn();
        let tables = load_schema(&conn, &["tmp_".to_string()]).unwrap();

        let names: Vec<_> = tables.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["codes", "customers", "order_lines", "orders"]);
    }

    #[test]
    fn test_column_metadata() {
        let conn = test_conn();
        let tables = load_schema(&conn, &[]).unwrap();

        let customers = &tables["customers"];
        assert_eq!(customers.column_names(), vec!["id", "name", "vip"]);
        let id = customers.column("id").unwrap();
        assert!(id.generated);
        assert!(!id.is_required());
        let vip = customers.column("vip").unwrap();
        assert_eq!(vip.column_type, ColumnType::Boolean);
        assert!(vip.has_default);
        assert!(customers.column("name").unwrap().is_required());

        let orders = &tables["orders"];
        assert_eq!(
            orders.column("created_at").unwrap().column_type,
            ColumnType::Timestamp
        );
        assert!(orders.column("id").unwrap().generated);
    }

    #[test]
    fn test_composite_and_without_rowid_keys() {
        let conn = test_conn();
        let tables = load_schema(&conn, &[]).unwrap();

        let lines = &tables["order_lines"];
        assert_eq!(lines.primary_key, vec!["order_id", "line"]);
        assert!(lines.key_columns().iter().all(|c| !c.generated));

        let codes = &tables["codes"];
        assert!(!codes.column("code").unwrap().generated);
    }

    #[test]
    fn test_foreign_keys_resolve_implicit_columns() {
        let conn = test_conn();
        let tables = load_schema(&conn, &[]).unwrap();

        let fk = tables["orders"].foreign_key("customer_id").unwrap();
        assert_eq!(fk.ref_table, "customers");
        assert_eq!(fk.ref_column, "id");

        let fk = tables["order_lines"].foreign_key("order_id").unwrap();
        assert_eq!(fk.ref_table, "orders");
        assert_eq!(fk.ref_column, "id");
    }

    #[test]
    fn test_introspect_single_table() {
        let conn = test_conn();
        assert_eq!(introspect_table(&conn, "customers").unwrap().primary_key, vec!["id"]);
        assert!(matches!(
            introspect_table(&conn, "nope"),
            Err(Error::UnknownTable(_))
        ));
        assert!(matches!(
            introspect_table(&conn, "event_log"),
            Err(Error::Introspection { .. })
        ));
    }
}
