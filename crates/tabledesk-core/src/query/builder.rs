//! Parameterized statement construction.
//!
//! Identifiers come only from the table descriptor and are always quoted;
//! caller values are always bound parameters. Every filter and sort column is
//! checked against the descriptor before any SQL is produced.

use rusqlite::params_from_iter;
use tracing::debug;

use super::functions::CASEFOLD_FUNCTION;
use super::{Criterion, FilterOp, FilterOperand, FilterSpec, PageWindow, SortSpec};
use crate::catalog::{ColumnDescriptor, ColumnType, TableDescriptor};
use crate::error::{Error, Result};
use crate::value::{Row, RowKey, Value};

/// A SQL statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        debug!(sql = %sql, params = params.len(), "Built statement");
        Self { sql, params }
    }

    /// Parameters in the form rusqlite expects.
    pub fn bind(&self) -> impl rusqlite::Params + '_ {
        params_from_iter(self.params.iter())
    }
}

/// Quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds statements against one table.
pub struct QueryBuilder<'a> {
    table: &'a TableDescriptor,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder for a table.
    pub fn new(table: &'a TableDescriptor) -> Self {
        Self { table }
    }

    /// The table this builder targets.
    pub fn table(&self) -> &'a TableDescriptor {
        self.table
    }

    /// `SELECT` a page of rows matching the filters.
    ///
    /// Rows are ordered by the sort keys, then by primary key ascending so
    /// that paging is stable.
    pub fn build_select(
        &self,
        filters: &FilterSpec,
        sort: &SortSpec,
        page: PageWindow,
    ) -> Result<Statement> {
        let (where_sql, mut params) = self.where_clause(filters)?;
        let order_sql = self.order_clause(sort)?;
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
            self.column_list(),
            quote_ident(&self.table.name),
            where_sql,
            order_sql
        );
        params.push(Value::Integer(bound_i64(page.limit())));
        params.push(Value::Integer(bound_i64(page.offset())));
        Ok(Statement::new(sql, params))
    }

    /// `SELECT COUNT(*)` of rows matching the filters.
    pub fn build_count(&self, filters: &FilterSpec) -> Result<Statement> {
        let (where_sql, params) = self.where_clause(filters)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_ident(&self.table.name),
            where_sql
        );
        Ok(Statement::new(sql, params))
    }

    /// `SELECT` every row matching the filters, in key order.
    pub fn build_select_all(&self, filters: &FilterSpec) -> Result<Statement> {
        let (where_sql, params) = self.where_clause(filters)?;
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            self.column_list(),
            quote_ident(&self.table.name),
            where_sql,
            self.order_clause(&SortSpec::new())?
        );
        Ok(Statement::new(sql, params))
    }

    /// `SELECT` the row with the given key.
    pub fn build_select_by_key(&self, key: &RowKey) -> Result<Statement> {
        let (key_sql, params) = self.key_clause(key)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.column_list(),
            quote_ident(&self.table.name),
            key_sql
        );
        Ok(Statement::new(sql, params))
    }

    /// `SELECT DISTINCT` non-null values of one column, sorted.
    pub fn build_distinct(&self, column: &str) -> Result<Statement> {
        let column = self.filter_column(column)?;
        let quoted = quote_ident(&column.name);
        let sql = format!(
            "SELECT DISTINCT {q} FROM {} WHERE {q} IS NOT NULL ORDER BY {q}",
            quote_ident(&self.table.name),
            q = quoted
        );
        Ok(Statement::new(sql, Vec::new()))
    }

    /// `INSERT` a validated row, returning the stored row so defaulted and
    /// generated columns come back. An empty row inserts the table defaults.
    pub fn build_insert(&self, row: &Row) -> Statement {
        let table = quote_ident(&self.table.name);
        if row.is_empty() {
            return Statement::new(
                format!(
                    "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                    table,
                    self.column_list()
                ),
                Vec::new(),
            );
        }
        let columns: Vec<String> = row.columns().map(quote_ident).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let params = row.iter().map(|(_, v)| v.clone()).collect();
        Statement::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                table,
                columns.join(", "),
                placeholders,
                self.column_list()
            ),
            params,
        )
    }

    /// `UPDATE` the row with the given key using a validated, non-empty patch.
    pub fn build_update(&self, key: &RowKey, patch: &Row) -> Result<Statement> {
        let assignments: Vec<String> = patch
            .columns()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect();
        let mut params: Vec<Value> = patch.iter().map(|(_, v)| v.clone()).collect();
        let (key_sql, key_params) = self.key_clause(key)?;
        params.extend(key_params);
        Ok(Statement::new(
            format!(
                "UPDATE {} SET {} WHERE {}",
                quote_ident(&self.table.name),
                assignments.join(", "),
                key_sql
            ),
            params,
        ))
    }

    /// `DELETE` the row with the given key.
    pub fn build_delete(&self, key: &RowKey) -> Result<Statement> {
        let (key_sql, params) = self.key_clause(key)?;
        Ok(Statement::new(
            format!(
                "DELETE FROM {} WHERE {}",
                quote_ident(&self.table.name),
                key_sql
            ),
            params,
        ))
    }

    /// `DELETE` every row.
    pub fn build_delete_all(&self) -> Statement {
        Statement::new(
            format!("DELETE FROM {}", quote_ident(&self.table.name)),
            Vec::new(),
        )
    }

    /// Read a result row produced by one of the `SELECT` or `INSERT`
    /// statements above.
    pub fn read_row(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
        let mut out = Row::new();
        for (index, column) in self.table.columns.iter().enumerate() {
            let value = Value::from_sql(row.get_ref(index)?, column.column_type);
            out.insert(column.name.clone(), value);
        }
        Ok(out)
    }

    /// Coerce a caller-supplied key to the table's key columns.
    ///
    /// The key must name exactly the primary-key columns.
    pub fn normalize_key(&self, key: &RowKey) -> Result<RowKey> {
        let matches_key = key.len() == self.table.primary_key.len()
            && self.table.primary_key.iter().all(|c| key.get(c).is_some());
        if !matches_key {
            return Err(Error::InvalidFilter(format!(
                "key for `{}` must name exactly the columns ({})",
                self.table.name,
                self.table.primary_key.join(", ")
            )));
        }

        let mut normalized = RowKey::new();
        for column in self.table.key_columns() {
            let value = key.get(&column.name).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                return Err(Error::InvalidFilter(format!(
                    "key column `{}` cannot be null",
                    column.name
                )));
            }
            let value = coerce_for(column, value)?;
            normalized.set(column.name.clone(), value);
        }
        Ok(normalized)
    }

    fn column_list(&self) -> String {
        self.table
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn filter_column(&self, name: &str) -> Result<&'a ColumnDescriptor> {
        self.table.column(name).ok_or_else(|| {
            Error::InvalidFilter(format!(
                "unknown column `{}` on table `{}`",
                name, self.table.name
            ))
        })
    }

    fn key_clause(&self, key: &RowKey) -> Result<(String, Vec<Value>)> {
        let key = self.normalize_key(key)?;
        let mut parts = Vec::with_capacity(key.len());
        let mut params = Vec::with_capacity(key.len());
        for column in &self.table.primary_key {
            parts.push(format!("{} = ?", quote_ident(column)));
            params.push(key.get(column).cloned().unwrap_or(Value::Null));
        }
        Ok((parts.join(" AND "), params))
    }

    fn where_clause(&self, filters: &FilterSpec) -> Result<(String, Vec<Value>)> {
        if filters.is_empty() {
            return Ok((String::new(), Vec::new()));
        }
        let mut parts = Vec::with_capacity(filters.len());
        let mut params = Vec::new();
        for criterion in filters.iter() {
            parts.push(self.predicate(criterion, &mut params)?);
        }
        Ok((format!(" WHERE {}", parts.join(" AND ")), params))
    }

    fn predicate(&self, criterion: &Criterion, params: &mut Vec<Value>) -> Result<String> {
        let column = self.filter_column(&criterion.column)?;
        let quoted = quote_ident(&column.name);
        let op = criterion.op;

        if op.is_ordering() && !column.column_type.is_ordered() {
            return Err(Error::InvalidFilter(format!(
                "operator `{}` is not supported on {} column `{}`",
                op, column.column_type, column.name
            )));
        }
        if op == FilterOp::Contains && !column.column_type.is_text() {
            return Err(Error::InvalidFilter(format!(
                "`contains` needs a text column, `{}` is {}",
                column.name, column.column_type
            )));
        }

        let value = match (&criterion.operand, op) {
            (FilterOperand::List(values), FilterOp::In) => {
                if values.is_empty() {
                    return Err(Error::InvalidFilter(format!(
                        "`in` on `{}` needs at least one value",
                        column.name
                    )));
                }
                for value in values {
                    if value.is_null() {
                        return Err(Error::InvalidFilter(format!(
                            "`in` on `{}` cannot contain null",
                            column.name
                        )));
                    }
                    params.push(coerce_for(column, value.clone())?);
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                return Ok(format!("{} IN ({})", quoted, placeholders));
            }
            (FilterOperand::Single(value), FilterOp::In) => {
                if value.is_null() {
                    return Err(Error::InvalidFilter(format!(
                        "`in` on `{}` needs at least one value",
                        column.name
                    )));
                }
                params.push(coerce_for(column, value.clone())?);
                return Ok(format!("{} IN (?)", quoted));
            }
            (FilterOperand::List(_), _) => {
                return Err(Error::InvalidFilter(format!(
                    "operator `{}` on `{}` takes a single value, not a list",
                    op, column.name
                )));
            }
            (FilterOperand::Single(value), _) => value,
        };

        match (op, value) {
            (FilterOp::Eq, Value::Null) => Ok(format!("{} IS NULL", quoted)),
            (FilterOp::Neq, Value::Null) => Ok(format!("{} IS NOT NULL", quoted)),
            (_, Value::Null) => Err(Error::InvalidFilter(format!(
                "operator `{}` on `{}` cannot compare with null",
                op, column.name
            ))),
            (FilterOp::Contains, value) => {
                params.push(Value::Text(value.to_string()));
                Ok(format!(
                    "instr({f}({}), {f}(?)) > 0",
                    quoted,
                    f = CASEFOLD_FUNCTION
                ))
            }
            (op, value) => {
                params.push(coerce_for(column, value.clone())?);
                let sql_op = match op {
                    FilterOp::Eq => "=",
                    FilterOp::Neq => "<>",
                    FilterOp::Lt => "<",
                    FilterOp::Lte => "<=",
                    FilterOp::Gt => ">",
                    _ => ">=",
                };
                Ok(format!("{} {} ?", quoted, sql_op))
            }
        }
    }

    fn order_clause(&self, sort: &SortSpec) -> Result<String> {
        let mut parts = Vec::new();
        let mut used: Vec<&str> = Vec::new();
        for key in sort.iter() {
            let column = self.filter_column(&key.column)?;
            if column.column_type == ColumnType::Blob {
                return Err(Error::InvalidFilter(format!(
                    "cannot sort by blob column `{}`",
                    column.name
                )));
            }
            if used.contains(&column.name.as_str()) {
                continue;
            }
            used.push(&column.name);
            parts.push(format!(
                "{} {}",
                quote_ident(&column.name),
                key.direction.as_sql()
            ));
        }
        for column in &self.table.primary_key {
            if !used.contains(&column.as_str()) {
                parts.push(format!("{} ASC", quote_ident(column)));
            }
        }
        Ok(parts.join(", "))
    }
}

/// Clamp a row count to the range SQLite binds; larger values would wrap
/// negative, which SQLite reads as "no limit" or "no offset".
fn bound_i64(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn coerce_for(column: &ColumnDescriptor, value: Value) -> Result<Value> {
    value.coerce(column.column_type).map_err(|reason| {
        Error::InvalidFilter(format!("value for `{}`: {}", column.name, reason))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::query::PageRequest;
    use pretty_assertions::assert_eq;

    fn orders() -> TableDescriptor {
        TableDescriptor::new(
            "orders",
            vec![
                ColumnDescriptor::new("id", "INTEGER").primary_key(1).generated(),
                ColumnDescriptor::new("customer", "TEXT").not_null(),
                ColumnDescriptor::new("total", "REAL"),
                ColumnDescriptor::new("paid", "BOOLEAN"),
                ColumnDescriptor::new("created_at", "DATETIME"),
            ],
        )
        .unwrap()
    }

    fn window() -> PageWindow {
        PageWindow { number: 2, size: 10 }
    }

    #[test]
    fn test_select_without_filters_orders_by_key() {
        let table = orders();
        let stmt = QueryBuilder::new(&table)
            .build_select(&FilterSpec::new(), &SortSpec::new(), window())
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"customer\", \"total\", \"paid\", \"created_at\" FROM \"orders\" \
             ORDER BY \"id\" ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(stmt.params, vec![Value::Integer(10), Value::Integer(10)]);
    }

    #[test]
    fn test_select_binds_every_value() {
        let table = orders();
        let filters = FilterSpec::new()
            .contains("customer", "ann")
            .gte("total", "99.5")
            .is_in("id", [1, 2])
            .eq("created_at", Value::Null);
        let sort = SortSpec::new().desc("total");

        let stmt = QueryBuilder::new(&table)
            .build_select(&filters, &sort, window())
            .unwrap();
        assert!(stmt.sql.contains(
            "WHERE instr(tabledesk_casefold(\"customer\"), tabledesk_casefold(?)) > 0 AND \"total\" >= ? \
             AND \"id\" IN (?, ?) AND \"created_at\" IS NULL"
        ));
        assert!(stmt.sql.contains("ORDER BY \"total\" DESC, \"id\" ASC"));
        assert_eq!(
            stmt.params,
            vec![
                Value::from("ann"),
                Value::Decimal(99.5),
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(10),
                Value::Integer(10),
            ]
        );
    }

    #[test]
    fn test_rejects_invalid_filters() {
        let table = orders();
        let builder = QueryBuilder::new(&table);
        let cases = [
            FilterSpec::new().eq("nope", 1),
            FilterSpec::new().contains("total", "1"),
            FilterSpec::new().lt("paid", true),
            FilterSpec::new().gt("total", "lots"),
            FilterSpec::new().is_in("id", Vec::<i64>::new()),
            FilterSpec::new().lt("total", Value::Null),
            FilterSpec::new().with(
                "id",
                FilterOp::Eq,
                FilterOperand::List(vec![Value::Integer(1)]),
            ),
        ];
        for filters in cases {
            assert!(
                matches!(builder.build_count(&filters), Err(Error::InvalidFilter(_))),
                "{:?}",
                filters
            );
        }
    }

    #[test]
    fn test_rejects_unknown_sort_column() {
        let table = orders();
        let err = QueryBuilder::new(&table).build_select(
            &FilterSpec::new(),
            &SortSpec::new().asc("missing"),
            window(),
        );
        assert!(matches!(err, Err(Error::InvalidFilter(_))));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_key_statements() {
        let table = orders();
        let builder = QueryBuilder::new(&table);
        let key = RowKey::new().with("id", "7");

        let stmt = builder.build_delete(&key).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"orders\" WHERE \"id\" = ?");
        assert_eq!(stmt.params, vec![Value::Integer(7)]);

        let patch = Row::new().with("total", 12.5).with("paid", true);
        let stmt = builder.build_update(&key, &patch).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"orders\" SET \"paid\" = ?, \"total\" = ? WHERE \"id\" = ?"
        );

        assert!(builder
            .build_select_by_key(&RowKey::new().with("customer", "x"))
            .is_err());
        assert!(builder
            .build_select_by_key(&RowKey::new().with("id", Value::Null))
            .is_err());
    }

    #[test]
    fn test_insert_statement() {
        let table = orders();
        let builder = QueryBuilder::new(&table);

        let stmt = builder.build_insert(&Row::new().with("customer", "ann").with("total", 5.0));
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"orders\" (\"customer\", \"total\") VALUES (?, ?) \
             RETURNING \"id\", \"customer\", \"total\", \"paid\", \"created_at\""
        );

        let stmt = builder.build_insert(&Row::new());
        assert!(stmt.sql.starts_with("INSERT INTO \"orders\" DEFAULT VALUES RETURNING"));
    }

    #[test]
    fn test_far_pages_bind_in_range() {
        let table = orders();
        let window = PageRequest::new(usize::MAX, 10).resolve(&EngineConfig::memory());
        let stmt = QueryBuilder::new(&table)
            .build_select(&FilterSpec::new(), &SortSpec::new(), window)
            .unwrap();
        assert_eq!(
            stmt.params,
            vec![Value::Integer(10), Value::Integer(i64::MAX)]
        );
    }
}
