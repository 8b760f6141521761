//! The engine: the single entry point for presentation layers.
//!
//! Every call names the acting subject. The call is authorized against the
//! current grant snapshot before the table is even looked up, then runs
//! against one catalog snapshot inside one backend transaction.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use tracing::info;

use crate::audit::{ensure_audit_table, query_audit, AuditRecord, AuditRecorder, TableAuditRecorder};
use crate::catalog::{SchemaCatalog, TableDescriptor};
use crate::config::{DatabaseLocation, EngineConfig};
use crate::error::{Error, Result};
use crate::mutation::MutationExecutor;
use crate::query::{register_functions, FilterSpec, Page, PageRequest, QueryBuilder, SortSpec};
use crate::security::{authorize, AccessGrant, GrantSet, GrantStore, Operation, Role};
use crate::value::{Row, RowKey, Value};

/// Schema-agnostic data access engine.
pub struct Engine {
    /// Backend connection; one logical operation at a time.
    conn: Mutex<Connection>,
    /// Introspected schema.
    catalog: SchemaCatalog,
    /// Current grant snapshot.
    grants: RwLock<Arc<GrantSet>>,
    /// Audit sink used by every mutation.
    recorder: Arc<dyn AuditRecorder>,
    config: EngineConfig,
}

impl Engine {
    /// Open the configured database.
    ///
    /// A missing database file is a connection error unless
    /// `create_if_missing` is set.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let conn = match &config.location {
            DatabaseLocation::Memory => Connection::open_in_memory()?,
            DatabaseLocation::File(path) => {
                let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                if config.create_if_missing {
                    flags |= OpenFlags::SQLITE_OPEN_CREATE;
                }
                Connection::open_with_flags(path, flags).map_err(|e| {
                    Error::Connection(format!("cannot open {}: {}", path.display(), e))
                })?
            }
        };
        Self::from_connection(conn, config)
    }

    /// Build an engine over an already open connection.
    ///
    /// Creates the reserved grant and audit tables when missing, then loads
    /// the schema catalog and the grant snapshot.
    pub fn from_connection(conn: Connection, config: EngineConfig) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        register_functions(&conn)?;
        ensure_audit_table(&conn)?;
        let grants = GrantStore::open(&conn)?.list()?;
        let catalog = SchemaCatalog::load(&conn, config.table_blocklist.clone())?;

        info!(
            location = ?config.location,
            tables = catalog.snapshot().len(),
            grants = grants.len(),
            "Engine opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            catalog,
            grants: RwLock::new(Arc::new(grants)),
            recorder: Arc::new(TableAuditRecorder::new()),
            config,
        })
    }

    /// Replace the audit recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn AuditRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The schema catalog.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Current grant snapshot.
    pub fn grants(&self) -> Arc<GrantSet> {
        Arc::clone(&self.grants.read())
    }

    /// Effective role of a subject on a table.
    pub fn role_of(&self, subject: &str, table: &str) -> Role {
        self.grants.read().effective_role(subject, table)
    }

    // ----- Schema -----

    /// Tables the subject may at least view, sorted by name.
    pub fn list_tables(&self, subject: &str) -> Vec<String> {
        let grants = self.grants();
        self.catalog
            .snapshot()
            .table_names()
            .into_iter()
            .filter(|table| grants.effective_role(subject, table).permits(Operation::Describe))
            .map(String::from)
            .collect()
    }

    /// Structural description of a table.
    pub fn describe_table(&self, subject: &str, table: &str) -> Result<TableDescriptor> {
        self.authorize(subject, table, Operation::Describe)?;
        self.catalog.describe_table(table)
    }

    /// Re-introspect the database. Operations already running keep their
    /// snapshot; later ones see the new schema.
    pub fn refresh_schema(&self) -> Result<u64> {
        let conn = self.conn.lock();
        self.catalog.refresh(&conn)
    }

    // ----- Reads -----

    /// Page through a table.
    pub fn browse(
        &self,
        subject: &str,
        table: &str,
        sort: &SortSpec,
        page: PageRequest,
    ) -> Result<Page<Row>> {
        self.select_page(subject, table, Operation::Browse, &FilterSpec::new(), sort, page)
    }

    /// Page through the rows matching `filters`.
    pub fn search(
        &self,
        subject: &str,
        table: &str,
        filters: &FilterSpec,
        sort: &SortSpec,
        page: PageRequest,
    ) -> Result<Page<Row>> {
        self.select_page(subject, table, Operation::Search, filters, sort, page)
    }

    /// Read one row by key.
    pub fn view(&self, subject: &str, table: &str, key: &RowKey) -> Result<Row> {
        self.authorize(subject, table, Operation::View)?;
        let mut conn = self.conn.lock();
        let schema = self.catalog.snapshot();
        let descriptor = schema.table(table)?;
        let builder = QueryBuilder::new(descriptor);
        let key = builder.normalize_key(key)?;
        let stmt = builder.build_select_by_key(&key)?;

        let tx = conn.transaction()?;
        let mut rows = tx
            .prepare(&stmt.sql)?
            .query_map(stmt.bind(), |row| builder.read_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.pop().ok_or_else(|| Error::NotFound {
            table: table.to_string(),
            key,
        })
    }

    /// Distinct values of the column a foreign key points at, for pick-lists.
    pub fn lookup_values(&self, subject: &str, table: &str, column: &str) -> Result<Vec<Value>> {
        self.authorize(subject, table, Operation::Lookup)?;
        let mut conn = self.conn.lock();
        let schema = self.catalog.snapshot();
        let descriptor = schema.table(table)?;
        let fk = descriptor.foreign_key(column).ok_or_else(|| {
            Error::InvalidFilter(format!(
                "column `{}` of `{}` is not a foreign key",
                column, table
            ))
        })?;
        let target = schema.table(&fk.ref_table)?;
        let target_column = target.column(&fk.ref_column).ok_or_else(|| {
            Error::InvalidFilter(format!(
                "`{}` references missing column `{}.{}`",
                column, fk.ref_table, fk.ref_column
            ))
        })?;
        let stmt = QueryBuilder::new(target).build_distinct(&target_column.name)?;

        let tx = conn.transaction()?;
        let mut prepared = tx.prepare(&stmt.sql)?;
        let values = prepared
            .query_map(stmt.bind(), |row| {
                Ok(Value::from_sql(row.get_ref(0)?, target_column.column_type))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    // ----- Mutations -----

    /// Insert one row.
    pub fn insert_one(&self, subject: &str, table: &str, row: Row) -> Result<Row> {
        self.mutate(subject, table, Operation::Insert, |executor| {
            executor.insert_one(row)
        })
    }

    /// Apply a partial update to one row.
    pub fn update_one(&self, subject: &str, table: &str, key: &RowKey, patch: Row) -> Result<Row> {
        self.mutate(subject, table, Operation::Update, |executor| {
            executor.update_one(key, patch)
        })
    }

    /// Delete one row, returning it.
    pub fn delete_one(&self, subject: &str, table: &str, key: &RowKey) -> Result<Row> {
        self.mutate(subject, table, Operation::Delete, |executor| {
            executor.delete_one(key)
        })
    }

    /// Insert a batch of rows, all or nothing.
    pub fn insert_bulk(&self, subject: &str, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let limit = self.config.max_batch_size;
        if rows.len() > limit {
            return Err(Error::BatchTooLarge {
                size: rows.len(),
                limit,
            });
        }
        self.mutate(subject, table, Operation::BulkInsert, |executor| {
            executor.insert_bulk(rows, limit)
        })
    }

    /// Delete every row of a table, recording one audit entry per row.
    pub fn delete_all_rows(&self, subject: &str, table: &str) -> Result<usize> {
        let limit = self.config.max_batch_size;
        self.mutate(subject, table, Operation::BulkDelete, |executor| {
            executor.delete_all(limit)
        })
    }

    // ----- Audit -----

    /// Page through audit records, for one table or, with `None`, for all.
    ///
    /// Audit-wide access needs an auditor grant on table `*`.
    pub fn view_audit(
        &self,
        subject: &str,
        table: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<AuditRecord>> {
        self.audit_page(
            subject,
            table,
            Operation::ViewAudit,
            FilterSpec::new(),
            &SortSpec::new(),
            page,
        )
    }

    /// Page through audit records matching `filters`.
    pub fn search_audit(
        &self,
        subject: &str,
        table: Option<&str>,
        filters: &FilterSpec,
        sort: &SortSpec,
        page: PageRequest,
    ) -> Result<Page<AuditRecord>> {
        self.audit_page(
            subject,
            table,
            Operation::SearchAudit,
            filters.clone(),
            sort,
            page,
        )
    }

    // ----- Grants -----

    /// Store a grant and reload the grant snapshot.
    pub fn grant(&self, grant: AccessGrant) -> Result<()> {
        let conn = self.conn.lock();
        GrantStore::open(&conn)?.put(&grant)?;
        self.swap_grants(&conn)?;
        Ok(())
    }

    /// Remove a grant and reload the grant snapshot.
    pub fn revoke(&self, subject: &str, table: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = GrantStore::open(&conn)?.remove(subject, table)?;
        self.swap_grants(&conn)?;
        Ok(removed)
    }

    /// Reload grants from the grant table. Returns how many are in effect.
    pub fn reload_grants(&self) -> Result<usize> {
        let conn = self.conn.lock();
        self.swap_grants(&conn)
    }

    // ----- Internals -----

    fn authorize(&self, subject: &str, table: &str, operation: Operation) -> Result<Role> {
        authorize(&self.grants(), subject, table, operation)
    }

    fn swap_grants(&self, conn: &Connection) -> Result<usize> {
        let grants = GrantStore::open(conn)?.list()?;
        let count = grants.len();
        *self.grants.write() = Arc::new(grants);
        info!(grants = count, "Grant snapshot reloaded");
        Ok(count)
    }

    fn select_page(
        &self,
        subject: &str,
        table: &str,
        operation: Operation,
        filters: &FilterSpec,
        sort: &SortSpec,
        page: PageRequest,
    ) -> Result<Page<Row>> {
        self.authorize(subject, table, operation)?;
        let mut conn = self.conn.lock();
        let schema = self.catalog.snapshot();
        let descriptor = schema.table(table)?;
        let builder = QueryBuilder::new(descriptor);
        let window = page.resolve(&self.config);
        let count = builder.build_count(filters)?;
        let select = builder.build_select(filters, sort, window)?;

        let tx = conn.transaction()?;
        let total: i64 = tx.query_row(&count.sql, count.bind(), |row| row.get(0))?;
        let items = tx
            .prepare(&select.sql)?
            .query_map(select.bind(), |row| builder.read_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page::new(items, total.max(0) as u64, window))
    }

    fn audit_page(
        &self,
        subject: &str,
        table: Option<&str>,
        operation: Operation,
        mut filters: FilterSpec,
        sort: &SortSpec,
        page: PageRequest,
    ) -> Result<Page<AuditRecord>> {
        match table {
            Some(table) => {
                self.authorize(subject, table, operation)?;
                filters = filters.eq("table", table);
            }
            None => {
                self.authorize(subject, "*", operation)?;
            }
        }
        let window = page.resolve(&self.config);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let records = query_audit(&tx, &filters, sort, window)?;
        Ok(records)
    }

    fn mutate<T>(
        &self,
        subject: &str,
        table: &str,
        operation: Operation,
        run: impl FnOnce(&MutationExecutor<'_>) -> Result<T>,
    ) -> Result<T> {
        self.authorize(subject, table, operation)?;
        let mut conn = self.conn.lock();
        let schema = self.catalog.snapshot();
        let descriptor = schema.table(table)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = {
            let executor = MutationExecutor::new(&tx, descriptor, self.recorder.as_ref(), subject);
            run(&executor)?
        };
        tx.commit().map_err(|e| Error::from_backend(table, e))?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);
             CREATE TABLE secrets (id INTEGER PRIMARY KEY, body TEXT);",
        )
        .unwrap();
        Engine::from_connection(conn, EngineConfig::memory()).unwrap()
    }

    #[test]
    fn test_reserved_tables_are_hidden() {
        let engine = engine();
        engine.grant("root:*:editor".parse().unwrap()).unwrap();
        assert_eq!(engine.list_tables("root"), vec!["notes", "secrets"]);
        assert!(matches!(
            engine.delete_all_rows("root", crate::AUDIT_TABLE),
            Err(Error::UnknownTable(_))
        ));
    }

    #[test]
    fn test_list_tables_filters_by_role() {
        let engine = engine();
        engine.grant("ann:notes:viewer".parse().unwrap()).unwrap();
        assert_eq!(engine.list_tables("ann"), vec!["notes"]);
        assert!(engine.list_tables("nobody").is_empty());
    }

    #[test]
    fn test_authorization_precedes_table_lookup() {
        let engine = engine();
        let err = engine
            .browse("ann", "missing", &SortSpec::new(), PageRequest::first())
            .unwrap_err();
        assert!(matches!(err, Error::Authorization { .. }));

        engine.grant("ann:*:viewer".parse().unwrap()).unwrap();
        let err = engine
            .browse("ann", "missing", &SortSpec::new(), PageRequest::first())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));
    }

    #[test]
    fn test_grant_and_revoke_reload_snapshot() {
        let engine = engine();
        engine.grant("ann:notes:editor".parse().unwrap()).unwrap();
        assert_eq!(engine.role_of("ann", "notes"), Role::Editor);

        assert!(engine.revoke("ann", "notes").unwrap());
        assert_eq!(engine.role_of("ann", "notes"), Role::None);
        assert_eq!(engine.reload_grants().unwrap(), 0);
    }

    #[test]
    fn test_refresh_picks_up_new_tables() {
        let engine = engine();
        engine.grant("ann:*:viewer".parse().unwrap()).unwrap();
        engine
            .conn
            .lock()
            .execute_batch("CREATE TABLE tags (name TEXT PRIMARY KEY)")
            .unwrap();
        assert!(engine.describe_table("ann", "tags").is_err());

        engine.refresh_schema().unwrap();
        assert_eq!(
            engine.describe_table("ann", "tags").unwrap().primary_key,
            vec!["name"]
        );
    }
}
