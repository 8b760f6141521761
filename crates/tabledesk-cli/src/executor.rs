//! Command execution against the engine.

use std::io::Write;

use tabledesk_core::{AccessGrant, Engine, ParseGrantError, PageRequest};
use thiserror::Error;
use tracing::info;

use crate::commands::{parse_import, Command, QueryArgs};
use crate::formatter::{CsvFormatter, Formatter, Grid};

/// Rows fetched per round trip while exporting.
const EXPORT_PAGE_SIZE: usize = 500;

/// Execution errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine error.
    #[error(transparent)]
    Engine(#[from] tabledesk_core::Error),

    /// Malformed grant expression.
    #[error("invalid grant: {0}")]
    Grant(#[from] ParseGrantError),

    /// Malformed JSON input.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// File access error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad command-line argument.
    #[error("{0}")]
    InvalidArgument(String),
}

/// Execute a command as `subject` and return formatted output.
pub fn execute(
    engine: &Engine,
    subject: &str,
    command: Command,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    match command {
        Command::Tables => Ok(formatter.format_grid(&Grid::from_tables(&engine.list_tables(subject)))),

        Command::Describe { table } => {
            let descriptor = engine.describe_table(subject, &table)?;
            Ok(formatter.format_grid(&Grid::from_descriptor(&descriptor)))
        }

        Command::Browse { table, query, page } => {
            let descriptor = engine.describe_table(subject, &table)?;
            let filters = query.filters()?;
            let rows = if filters.is_empty() {
                engine.browse(subject, &table, &query.sort()?, page.request())?
            } else {
                engine.search(subject, &table, &filters, &query.sort()?, page.request())?
            };
            Ok(formatter.format_grid(&Grid::from_rows(&descriptor, &rows)))
        }

        Command::View { table, key } => {
            let descriptor = engine.describe_table(subject, &table)?;
            let row = engine.view(subject, &table, &key.row_key()?)?;
            Ok(formatter.format_grid(&Grid::from_row(&descriptor, &row)))
        }

        Command::Lookup { table, column } => {
            let values = engine.lookup_values(subject, &table, &column)?;
            Ok(formatter.format_grid(&Grid::from_values(&column, &values)))
        }

        Command::Insert { table, values } => {
            let row = engine.insert_one(subject, &table, values.row()?)?;
            let descriptor = engine.describe_table(subject, &table)?;
            Ok(formatter.format_grid(&Grid::from_row(&descriptor, &row)))
        }

        Command::Update { table, key, values } => {
            let row = engine.update_one(subject, &table, &key.row_key()?, values.row()?)?;
            let descriptor = engine.describe_table(subject, &table)?;
            Ok(formatter.format_grid(&Grid::from_row(&descriptor, &row)))
        }

        Command::Delete { table, key } => {
            let row_key = key.row_key()?;
            engine.delete_one(subject, &table, &row_key)?;
            Ok(formatter.format_mutation_result(1, &format!("deleted {} {}", table, row_key)))
        }

        Command::Import { table, file } => {
            let text = std::fs::read_to_string(&file)?;
            let rows = parse_import(&text)?;
            let stored = engine.insert_bulk(subject, &table, rows)?;
            info!(table = %table, file = %file.display(), rows = stored.len(), "Import finished");
            Ok(formatter.format_mutation_result(
                stored.len(),
                &format!("imported into {}", table),
            ))
        }

        Command::Export {
            table,
            query,
            output,
        } => {
            let csv = export_csv(engine, subject, &table, &query)?;
            match output {
                Some(path) => {
                    let mut file = std::fs::File::create(&path)?;
                    file.write_all(csv.as_bytes())?;
                    Ok(formatter.format_message(&format!(
                        "exported {} to {}",
                        table,
                        path.display()
                    )))
                }
                None => Ok(csv),
            }
        }

        Command::Truncate { table, yes } => {
            if !yes {
                return Err(CliError::InvalidArgument(format!(
                    "refusing to delete every row of `{}` without --yes",
                    table
                )));
            }
            let deleted = engine.delete_all_rows(subject, &table)?;
            Ok(formatter.format_mutation_result(deleted, &format!("truncated {}", table)))
        }

        Command::Audit { table, query, page } => {
            let filters = query.filters()?;
            let records = engine.search_audit(
                subject,
                table.as_deref(),
                &filters,
                &query.sort()?,
                page.request(),
            )?;
            Ok(formatter.format_grid(&Grid::from_audit(&records)))
        }

        Command::Grant { grant } => {
            let grant: AccessGrant = grant.parse()?;
            let message = format!("granted {}", grant);
            engine.grant(grant)?;
            Ok(formatter.format_message(&message))
        }

        Command::Revoke { subject: who, table } => {
            let message = if engine.revoke(&who, &table)? {
                format!("revoked {} on {}", who, table)
            } else {
                format!("no grant for {} on {}", who, table)
            };
            Ok(formatter.format_message(&message))
        }

        Command::Grants => Ok(formatter.format_grid(&Grid::from_grants(&engine.grants()))),

        Command::Refresh => {
            let version = engine.refresh_schema()?;
            Ok(formatter.format_message(&format!("schema reloaded (version {})", version)))
        }
    }
}

/// Every matching row as CSV, fetched page by page.
fn export_csv(
    engine: &Engine,
    subject: &str,
    table: &str,
    query: &QueryArgs,
) -> Result<String, CliError> {
    let descriptor = engine.describe_table(subject, table)?;
    let filters = query.filters()?;
    let sort = query.sort()?;
    let csv = CsvFormatter;

    let mut output = String::new();
    let mut number = 1;
    loop {
        let page = engine.search(
            subject,
            table,
            &filters,
            &sort,
            PageRequest::new(number, EXPORT_PAGE_SIZE),
        )?;
        let grid = Grid::from_rows(&descriptor, &page);
        if number == 1 {
            output.push_str(&csv.format_header(&grid));
        }
        output.push_str(&csv.format_records(&grid));
        if !page.has_next() {
            break;
        }
        number += 1;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{KeyArgs, PageArgs, ValueArgs};
    use crate::formatter::JsonFormatter;
    use rusqlite::Connection;
    use tabledesk_core::EngineConfig;

    fn engine() -> Engine {
        engine_with(EngineConfig::memory())
    }

    fn engine_with(config: EngineConfig) -> Engine {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER);",
        )
        .unwrap();
        let engine = Engine::from_connection(conn, config).unwrap();
        engine.grant("ann:*:editor".parse().unwrap()).unwrap();
        engine
    }

    fn run(engine: &Engine, command: Command) -> Result<String, CliError> {
        execute(engine, "ann", command, &JsonFormatter)
    }

    fn insert(engine: &Engine, name: &str, age: &str) {
        run(
            engine,
            Command::Insert {
                table: "people".to_string(),
                values: ValueArgs {
                    assignments: vec![format!("name={}", name), format!("age={}", age)],
                    json: None,
                },
            },
        )
        .unwrap();
    }

    #[test]
    fn test_insert_then_browse() {
        let engine = engine();
        insert(&engine, "Ann", "41");
        insert(&engine, "Bob", "29");

        let output = run(
            &engine,
            Command::Browse {
                table: "people".to_string(),
                query: QueryArgs {
                    criteria: vec!["age:gt:30".to_string()],
                    ..QueryArgs::default()
                },
                page: PageArgs { page: 1, size: None },
            },
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["total"], 1);
        assert_eq!(value["items"][0]["name"], "Ann");
        assert_eq!(value["items"][0]["age"], 41);
    }

    #[test]
    fn test_truncate_requires_confirmation() {
        let engine = engine();
        insert(&engine, "Ann", "41");

        let err = run(
            &engine,
            Command::Truncate {
                table: "people".to_string(),
                yes: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));

        run(
            &engine,
            Command::Truncate {
                table: "people".to_string(),
                yes: true,
            },
        )
        .unwrap();
        let err = run(
            &engine,
            Command::View {
                table: "people".to_string(),
                key: KeyArgs {
                    key: vec!["id=1".to_string()],
                },
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CliError::Engine(tabledesk_core::Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_export_spans_pages() {
        let engine = engine_with(EngineConfig::memory().with_max_batch_size(EXPORT_PAGE_SIZE * 2));
        let rows: Vec<String> = (0..(EXPORT_PAGE_SIZE + 3))
            .map(|i| format!(r#"{{"name": "p{}"}}"#, i))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("people.json");
        std::fs::write(&file, format!("[{}]", rows.join(","))).unwrap();

        run(
            &engine,
            Command::Import {
                table: "people".to_string(),
                file,
            },
        )
        .unwrap();

        let csv = export_csv(&engine, "ann", "people", &QueryArgs::default()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,name,age");
        assert_eq!(lines.len(), EXPORT_PAGE_SIZE + 4);
        assert_eq!(lines[1], "1,\"p0\",");
    }

    #[test]
    fn test_grant_commands() {
        let engine = engine();
        run(
            &engine,
            Command::Grant {
                grant: "bob:people:viewer".to_string(),
            },
        )
        .unwrap();
        assert_eq!(engine.list_tables("bob"), vec!["people"]);

        let err = run(
            &engine,
            Command::Grant {
                grant: "bob:people:owner".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Grant(_)));

        run(
            &engine,
            Command::Revoke {
                subject: "bob".to_string(),
                table: "people".to_string(),
            },
        )
        .unwrap();
        assert!(engine.list_tables("bob").is_empty());
    }
}
