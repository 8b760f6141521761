//! Subcommands and their argument parsing.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Subcommand};
use tabledesk_core::{
    FilterResolver, FilterSpec, PageRequest, RawCriterion, Row, RowKey, SortSpec, Value,
};

use crate::executor::CliError;

/// Administration commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the tables you can see
    Tables,

    /// Show the columns of a table
    Describe { table: String },

    /// Page through a table, optionally filtered and sorted
    Browse {
        table: String,
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Show one row by key
    View {
        table: String,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// List the values a foreign-key column may take
    Lookup { table: String, column: String },

    /// Insert one row from `column=value` pairs or a JSON object
    Insert {
        table: String,
        #[command(flatten)]
        values: ValueArgs,
    },

    /// Update columns of one row
    Update {
        table: String,
        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        values: ValueArgs,
    },

    /// Delete one row
    Delete {
        table: String,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Insert every row of a JSON array file, all or nothing
    Import { table: String, file: PathBuf },

    /// Write matching rows as CSV
    Export {
        table: String,
        #[command(flatten)]
        query: QueryArgs,
        /// Destination file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete every row of a table
    Truncate {
        table: String,
        /// Confirm deleting every row
        #[arg(long)]
        yes: bool,
    },

    /// Page through audit records
    Audit {
        /// Restrict to one table (all tables need an auditor grant on `*`)
        #[arg(short, long)]
        table: Option<String>,
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Add or replace a grant, written `subject:table:role`
    Grant { grant: String },

    /// Remove the grant for a subject and table
    Revoke { subject: String, table: String },

    /// List all grants
    Grants,

    /// Re-read the database schema
    Refresh,
}

/// Filter and sort options.
#[derive(ClapArgs, Debug, Default)]
pub struct QueryArgs {
    /// Criterion written `column:op:value` (repeatable)
    #[arg(short = 'w', long = "where")]
    pub criteria: Vec<String>,

    /// Criteria as a JSON array of {"column", "op", "value"}
    #[arg(long)]
    pub filter_json: Option<String>,

    /// Sort key written `column`, `column:asc` or `column:desc` (repeatable)
    #[arg(short, long)]
    pub sort: Vec<String>,
}

impl QueryArgs {
    pub fn filters(&self) -> Result<FilterSpec, CliError> {
        let mut raw: Vec<RawCriterion> = match &self.filter_json {
            Some(text) => serde_json::from_str(text).map_err(|e| {
                CliError::InvalidArgument(format!("malformed --filter-json: {}", e))
            })?,
            None => Vec::new(),
        };
        for expr in &self.criteria {
            raw.push(FilterResolver::parse_expr(expr)?);
        }
        Ok(FilterResolver::parse(&raw)?)
    }

    pub fn sort(&self) -> Result<SortSpec, CliError> {
        Ok(FilterResolver::parse_sort(self.sort.as_slice())?)
    }
}

/// Paging options.
#[derive(ClapArgs, Debug)]
pub struct PageArgs {
    /// Page number, starting at 1
    #[arg(short, long, default_value_t = 1)]
    pub page: usize,

    /// Rows per page
    #[arg(long)]
    pub size: Option<usize>,
}

impl PageArgs {
    pub fn request(&self) -> PageRequest {
        PageRequest {
            number: self.page,
            size: self.size,
        }
    }
}

/// Row key options.
#[derive(ClapArgs, Debug)]
pub struct KeyArgs {
    /// Key column written `column=value` (repeat for composite keys)
    #[arg(short, long = "key", required = true)]
    pub key: Vec<String>,
}

impl KeyArgs {
    pub fn row_key(&self) -> Result<RowKey, CliError> {
        let mut key = RowKey::new();
        for pair in &self.key {
            let (column, value) = parse_assignment(pair)?;
            key = key.with(column, value);
        }
        Ok(key)
    }
}

/// Column value options.
#[derive(ClapArgs, Debug)]
pub struct ValueArgs {
    /// Column value written `column=value`; `null` clears a column
    pub assignments: Vec<String>,

    /// Values as a JSON object
    #[arg(long)]
    pub json: Option<String>,
}

impl ValueArgs {
    /// Merge the JSON object and the assignments; assignments win.
    pub fn row(&self) -> Result<Row, CliError> {
        let mut row = match &self.json {
            Some(text) => parse_json_row(text)?,
            None => Row::new(),
        };
        for pair in &self.assignments {
            let (column, value) = parse_assignment(pair)?;
            row.insert(column, value);
        }
        Ok(row)
    }
}

/// Split `column=value`. Values stay text; the engine coerces them to the
/// column type. The literal `null` means NULL.
pub fn parse_assignment(pair: &str) -> Result<(String, Value), CliError> {
    let (column, value) = pair
        .split_once('=')
        .ok_or_else(|| CliError::InvalidArgument(format!("expected column=value, got '{}'", pair)))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "missing column name in '{}'",
            pair
        )));
    }
    let value = match value {
        "null" => Value::Null,
        text => Value::Text(text.to_string()),
    };
    Ok((column.to_string(), value))
}

fn parse_json_row(text: &str) -> Result<Row, CliError> {
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Object(object) => {
            Row::from_json_object(&object).map_err(CliError::InvalidArgument)
        }
        _ => Err(CliError::InvalidArgument(
            "row JSON must be an object".to_string(),
        )),
    }
}

/// Parse the rows of an import file: a JSON array of objects.
pub fn parse_import(text: &str) -> Result<Vec<Row>, CliError> {
    let serde_json::Value::Array(items) = serde_json::from_str::<serde_json::Value>(text)? else {
        return Err(CliError::InvalidArgument(
            "import file must hold a JSON array of objects".to_string(),
        ));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            serde_json::Value::Object(object) => Row::from_json_object(object)
                .map_err(|e| CliError::InvalidArgument(format!("row {}: {}", index, e))),
            _ => Err(CliError::InvalidArgument(format!(
                "row {}: expected an object",
                index
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("name=Ann=Lee").unwrap(),
            ("name".to_string(), Value::from("Ann=Lee"))
        );
        assert_eq!(
            parse_assignment("email=null").unwrap(),
            ("email".to_string(), Value::Null)
        );
        assert!(parse_assignment("name").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_values_merge_json_and_assignments() {
        let args = ValueArgs {
            assignments: vec!["age=42".to_string()],
            json: Some(r#"{"name": "Ann", "age": 41}"#.to_string()),
        };
        let row = args.row().unwrap();
        assert_eq!(row.get("name"), Some(&Value::from("Ann")));
        assert_eq!(row.get("age"), Some(&Value::from("42")));
    }

    #[test]
    fn test_composite_key() {
        let args = KeyArgs {
            key: vec!["order_id=3".to_string(), "seq=1".to_string()],
        };
        let key = args.row_key().unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key.get("seq"), Some(&Value::from("1")));
    }

    #[test]
    fn test_query_args_combine_sources() {
        let args = QueryArgs {
            criteria: vec!["status:eq:open".to_string()],
            filter_json: Some(r#"[{"column": "total", "op": "gte", "value": 10}]"#.to_string()),
            sort: vec!["total:desc".to_string()],
        };
        assert_eq!(args.filters().unwrap().len(), 2);
        assert!(!args.sort().unwrap().is_empty());

        let bad = QueryArgs {
            criteria: vec!["status:like:open".to_string()],
            ..QueryArgs::default()
        };
        assert!(bad.filters().is_err());
    }

    #[test]
    fn test_parse_import() {
        let rows = parse_import(r#"[{"name": "a"}, {"name": "b", "vip": true}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("vip"), Some(&Value::Bool(true)));

        assert!(parse_import(r#"{"name": "a"}"#).is_err());
        assert!(parse_import(r#"[{"name": "a"}, 3]"#).is_err());
    }
}
