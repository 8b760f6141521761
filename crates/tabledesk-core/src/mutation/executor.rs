//! Mutation executor.
//!
//! Runs row mutations inside a caller-owned transaction and writes one audit
//! record per mutated row through the same transaction. The caller commits;
//! if anything here fails the transaction is dropped and rolls back.

use rusqlite::{OptionalExtension, Transaction};
use tracing::info;

use super::{validate_insert, validate_patch};
use crate::audit::{AuditOperation, AuditRecord, AuditRecorder};
use crate::catalog::TableDescriptor;
use crate::error::{Error, Result, RowViolations};
use crate::query::{FilterSpec, QueryBuilder};
use crate::value::{Row, RowKey};

/// Executes mutations against one table within one transaction.
pub struct MutationExecutor<'a> {
    tx: &'a Transaction<'a>,
    builder: QueryBuilder<'a>,
    recorder: &'a dyn AuditRecorder,
    subject: &'a str,
}

impl<'a> MutationExecutor<'a> {
    /// Create a new mutation executor.
    pub fn new(
        tx: &'a Transaction<'a>,
        table: &'a TableDescriptor,
        recorder: &'a dyn AuditRecorder,
        subject: &'a str,
    ) -> Self {
        Self {
            tx,
            builder: QueryBuilder::new(table),
            recorder,
            subject,
        }
    }

    fn table(&self) -> &'a TableDescriptor {
        self.builder.table()
    }

    /// Insert one row and return it as stored, including generated values.
    pub fn insert_one(&self, row: Row) -> Result<Row> {
        let row = validate_insert(self.table(), row).map_err(|violations| Error::Validation {
            table: self.table().name.clone(),
            rows: vec![RowViolations::single(violations)],
        })?;
        let stored = self.insert_validated(&row, AuditOperation::Insert)?;
        info!(
            table = %self.table().name,
            subject = %self.subject,
            "Row inserted"
        );
        Ok(stored)
    }

    /// Apply a partial update to the row with `key`.
    ///
    /// A patch that changes nothing writes nothing and records nothing.
    pub fn update_one(&self, key: &RowKey, patch: Row) -> Result<Row> {
        let key = self.builder.normalize_key(key)?;
        let current = self.fetch(&key)?.ok_or_else(|| self.not_found(&key))?;

        let patch = validate_patch(self.table(), patch, &current).map_err(|violations| {
            Error::Validation {
                table: self.table().name.clone(),
                rows: vec![RowViolations::single(violations)],
            }
        })?;
        if patch.is_empty() {
            return Ok(current);
        }

        let stmt = self.builder.build_update(&key, &patch)?;
        self.tx
            .execute(&stmt.sql, stmt.bind())
            .map_err(|e| Error::from_backend(&self.table().name, e))?;

        let updated = self.fetch(&key)?.ok_or_else(|| self.not_found(&key))?;
        self.audit(key, AuditOperation::Update, Some(&current), Some(&updated))?;
        info!(
            table = %self.table().name,
            subject = %self.subject,
            columns = patch.len(),
            "Row updated"
        );
        Ok(updated)
    }

    /// Delete the row with `key` and return it.
    pub fn delete_one(&self, key: &RowKey) -> Result<Row> {
        let key = self.builder.normalize_key(key)?;
        let current = self.fetch(&key)?.ok_or_else(|| self.not_found(&key))?;

        let stmt = self.builder.build_delete(&key)?;
        self.tx
            .execute(&stmt.sql, stmt.bind())
            .map_err(|e| Error::from_backend(&self.table().name, e))?;

        self.audit(key, AuditOperation::Delete, Some(&current), None)?;
        info!(
            table = %self.table().name,
            subject = %self.subject,
            "Row deleted"
        );
        Ok(current)
    }

    /// Insert a batch of rows, all or nothing.
    ///
    /// Every row is validated before anything is written; the error lists
    /// every failing row by position.
    pub fn insert_bulk(&self, rows: Vec<Row>, limit: usize) -> Result<Vec<Row>> {
        if rows.len() > limit {
            return Err(Error::BatchTooLarge {
                size: rows.len(),
                limit,
            });
        }

        let mut valid = Vec::with_capacity(rows.len());
        let mut failures = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            match validate_insert(self.table(), row) {
                Ok(row) => valid.push(row),
                Err(violations) => failures.push(RowViolations::at(index, violations)),
            }
        }
        if !failures.is_empty() {
            return Err(Error::Validation {
                table: self.table().name.clone(),
                rows: failures,
            });
        }

        let mut stored = Vec::with_capacity(valid.len());
        for (index, row) in valid.iter().enumerate() {
            let row = self
                .insert_validated(row, AuditOperation::BulkInsert)
                .map_err(|e| e.at_row(index))?;
            stored.push(row);
        }
        info!(
            table = %self.table().name,
            subject = %self.subject,
            rows = stored.len(),
            "Bulk insert applied"
        );
        Ok(stored)
    }

    /// Delete every row of the table, recording each one.
    ///
    /// Fails with `BatchTooLarge` before touching anything when the table
    /// holds more than `limit` rows. Returns the number of deleted rows.
    pub fn delete_all(&self, limit: usize) -> Result<usize> {
        let everything = FilterSpec::new();
        let count = self.builder.build_count(&everything)?;
        let total: i64 = self
            .tx
            .query_row(&count.sql, count.bind(), |row| row.get(0))?;
        let total = total.max(0) as usize;
        if total > limit {
            return Err(Error::BatchTooLarge { size: total, limit });
        }

        let select = self.builder.build_select_all(&everything)?;
        let mut stmt = self.tx.prepare(&select.sql)?;
        let rows = stmt
            .query_map(select.bind(), |row| self.builder.read_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let delete = self.builder.build_delete_all();
        self.tx
            .execute(&delete.sql, delete.bind())
            .map_err(|e| Error::from_backend(&self.table().name, e))?;

        for row in &rows {
            let key = self.key_of(row)?;
            self.audit(key, AuditOperation::BulkDelete, Some(row), None)?;
        }
        info!(
            table = %self.table().name,
            subject = %self.subject,
            rows = rows.len(),
            "All rows deleted"
        );
        Ok(rows.len())
    }

    /// Load the row with an already normalized key.
    pub fn fetch(&self, key: &RowKey) -> Result<Option<Row>> {
        let stmt = self.builder.build_select_by_key(key)?;
        let row = self
            .tx
            .query_row(&stmt.sql, stmt.bind(), |row| self.builder.read_row(row))
            .optional()?;
        Ok(row)
    }

    fn insert_validated(&self, row: &Row, operation: AuditOperation) -> Result<Row> {
        let stmt = self.builder.build_insert(row);
        let stored = self
            .tx
            .query_row(&stmt.sql, stmt.bind(), |r| self.builder.read_row(r))
            .map_err(|e| Error::from_backend(&self.table().name, e))?;

        let key = self.key_of(&stored)?;
        self.audit(key, operation, None, Some(&stored))?;
        Ok(stored)
    }

    fn key_of(&self, row: &Row) -> Result<RowKey> {
        let key = row
            .key(&self.table().primary_key)
            .ok_or_else(|| {
                Error::InvalidFilter(format!(
                    "row of `{}` has no complete primary key",
                    self.table().name
                ))
            })?;
        self.builder.normalize_key(&key)
    }

    fn audit(
        &self,
        key: RowKey,
        operation: AuditOperation,
        before: Option<&Row>,
        after: Option<&Row>,
    ) -> Result<()> {
        let record = AuditRecord::new(
            self.table().name.clone(),
            key,
            operation,
            self.subject,
            before,
            after,
        );
        self.recorder.record(self.tx, &record)
    }

    fn not_found(&self, key: &RowKey) -> Error {
        Error::NotFound {
            table: self.table().name.clone(),
            key: key.clone(),
        }
    }
}
