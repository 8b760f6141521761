//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use tabledesk_core::{AuditRecord, GrantSet, Page, Row, TableDescriptor, Value};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Position of a grid within a paged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub number: usize,
    pub size: usize,
    pub total: u64,
    pub page_count: u64,
}

impl<T> From<&Page<T>> for PageInfo {
    fn from(page: &Page<T>) -> Self {
        Self {
            number: page.number,
            size: page.size,
            total: page.total,
            page_count: page.page_count(),
        }
    }
}

/// Tabular result: named columns and rows of JSON cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub page: Option<PageInfo>,
}

impl Grid {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
            page: None,
        }
    }

    pub fn push(&mut self, row: Vec<serde_json::Value>) {
        self.rows.push(row);
    }

    /// Rows of a data page, columns in table order.
    pub fn from_rows(table: &TableDescriptor, page: &Page<Row>) -> Self {
        let headers: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
        let mut grid = Self::new(headers);
        for row in &page.items {
            grid.push(row_cells(&grid.headers, row));
        }
        grid.page = Some(PageInfo::from(page));
        grid
    }

    /// A single row, columns in table order.
    pub fn from_row(table: &TableDescriptor, row: &Row) -> Self {
        let headers: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
        let mut grid = Self::new(headers);
        grid.push(row_cells(&grid.headers, row));
        grid
    }

    /// One line per column of a table.
    pub fn from_descriptor(table: &TableDescriptor) -> Self {
        let mut grid = Self::new(
            ["column", "type", "declared", "nullable", "key", "generated", "references"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
        );
        for column in &table.columns {
            let references = table
                .foreign_key(&column.name)
                .map(|fk| format!("{}.{}", fk.ref_table, fk.ref_column).into())
                .unwrap_or(serde_json::Value::Null);
            grid.push(vec![
                column.name.clone().into(),
                column.column_type.to_string().into(),
                column.declared_type.clone().into(),
                column.nullable.into(),
                column.primary_key.map(|p| p as u64).into(),
                column.generated.into(),
                references,
            ]);
        }
        grid
    }

    pub fn from_tables(tables: &[String]) -> Self {
        let mut grid = Self::new(vec!["table".to_string()]);
        for table in tables {
            grid.push(vec![table.clone().into()]);
        }
        grid
    }

    pub fn from_values(column: &str, values: &[Value]) -> Self {
        let mut grid = Self::new(vec![column.to_string()]);
        for value in values {
            grid.push(vec![value.to_json()]);
        }
        grid
    }

    pub fn from_audit(page: &Page<AuditRecord>) -> Self {
        let mut grid = Self::new(
            ["id", "timestamp", "table", "key", "operation", "subject", "before", "after"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
        );
        for record in &page.items {
            grid.push(vec![
                record.id.into(),
                record.timestamp.to_string().into(),
                record.table.clone().into(),
                record.key.to_json_string().into(),
                record.operation.as_str().into(),
                record.subject.clone().into(),
                image_cell(record.before.as_ref()),
                image_cell(record.after.as_ref()),
            ]);
        }
        grid.page = Some(PageInfo::from(page));
        grid
    }

    pub fn from_grants(grants: &GrantSet) -> Self {
        let mut grid = Self::new(vec![
            "subject".to_string(),
            "table".to_string(),
            "role".to_string(),
        ]);
        for grant in grants.iter() {
            grid.push(vec![
                grant.subject.as_str().into(),
                grant.table.as_str().into(),
                grant.role.as_str().into(),
            ]);
        }
        grid
    }

    /// Rows as JSON objects keyed by header.
    fn to_objects(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<_, _> = self
                    .headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

fn row_cells(headers: &[String], row: &Row) -> Vec<serde_json::Value> {
    headers
        .iter()
        .map(|h| row.get(h).map(Value::to_json).unwrap_or(serde_json::Value::Null))
        .collect()
}

fn image_cell(image: Option<&serde_json::Map<String, serde_json::Value>>) -> serde_json::Value {
    match image {
        Some(image) => serde_json::Value::Object(image.clone()).to_string().into(),
        None => serde_json::Value::Null,
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format tabular results.
    fn format_grid(&self, grid: &Grid) -> String;

    /// Format a mutation result.
    fn format_mutation_result(&self, affected: usize, message: &str) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_grid(&self, grid: &Grid) -> String {
        if grid.rows.is_empty() && grid.page.map_or(true, |p| p.total == 0) {
            return "No results".to_string();
        }

        let mut table = Table::new();
        table.set_header(grid.headers.iter().map(Cell::new).collect::<Vec<_>>());
        for row in &grid.rows {
            table.add_row(row.iter().map(|v| Cell::new(format_cell(v))).collect::<Vec<_>>());
        }

        match grid.page {
            Some(page) => format!(
                "{}\n{} row(s), page {} of {} ({} total)",
                table,
                grid.rows.len(),
                page.number,
                page.page_count.max(1),
                page.total
            ),
            None => format!("{}\n{} row(s)", table, grid.rows.len()),
        }
    }

    fn format_mutation_result(&self, affected: usize, message: &str) -> String {
        if message.is_empty() {
            format!("{} row(s) affected", affected)
        } else {
            format!("{} row(s) affected: {}", affected, message)
        }
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_grid(&self, grid: &Grid) -> String {
        let items = serde_json::Value::Array(grid.to_objects());
        let value = match grid.page {
            Some(page) => serde_json::json!({
                "page": page.number,
                "size": page.size,
                "total": page.total,
                "items": items,
            }),
            None => items,
        };
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_mutation_result(&self, affected: usize, message: &str) -> String {
        serde_json::json!({
            "affected": affected,
            "message": message
        })
        .to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({
            "error": error
        })
        .to_string()
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({
            "message": message
        })
        .to_string()
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl CsvFormatter {
    /// Data lines only, for appending further pages of an export.
    pub fn format_records(&self, grid: &Grid) -> String {
        let mut output = String::new();
        for row in &grid.rows {
            let cells: Vec<String> = row.iter().map(format_cell_csv).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }
        output
    }

    pub fn format_header(&self, grid: &Grid) -> String {
        let headers: Vec<String> = grid.headers.iter().map(|h| quote_csv(h)).collect();
        format!("{}\n", headers.join(","))
    }
}

impl Formatter for CsvFormatter {
    fn format_grid(&self, grid: &Grid) -> String {
        format!("{}{}", self.format_header(grid), self.format_records(grid))
    }

    fn format_mutation_result(&self, affected: usize, message: &str) -> String {
        format!("affected,message\n{},\"{}\"", affected, escape_csv(message))
    }

    fn format_error(&self, error: &str) -> String {
        format!("error\n\"{}\"", escape_csv(error))
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// Format a cell for display.
fn format_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Format a cell for CSV output; null is the empty field.
fn format_cell_csv(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => format!("\"{}\"", escape_csv(s)),
        other => other.to_string(),
    }
}

fn quote_csv(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", escape_csv(s))
    } else {
        s.to_string()
    }
}

/// Escape a string for CSV.
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}
