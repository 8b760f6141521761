//! Engine error types.
//!
//! Every failure the engine can report is one of the variants below, so the
//! presentation layer can tell an authorization denial apart from a bad
//! request or a backend outage without inspecting messages.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::security::Operation;
use crate::value::RowKey;

/// Result type for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a single column was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// A required column was not supplied.
    Missing,
    /// A null was supplied for a non-nullable column.
    NotNullable,
    /// The value could not be coerced to the column type.
    TypeMismatch {
        /// Declared column type.
        expected: String,
        /// What went wrong while coercing.
        reason: String,
    },
    /// The payload names a column the table does not have.
    UnknownColumn,
    /// An update tried to change a primary-key column.
    PrimaryKeyImmutable,
    /// The backend rejected the row (foreign key, unique, check).
    Constraint {
        /// Backend message.
        message: String,
    },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Missing => write!(f, "required value missing"),
            ViolationKind::NotNullable => write!(f, "null not allowed"),
            ViolationKind::TypeMismatch { expected, reason } => {
                write!(f, "expected {}: {}", expected, reason)
            }
            ViolationKind::UnknownColumn => write!(f, "no such column"),
            ViolationKind::PrimaryKeyImmutable => write!(f, "primary key cannot be changed"),
            ViolationKind::Constraint { message } => write!(f, "constraint failed: {}", message),
        }
    }
}

/// A violation attached to one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnViolation {
    /// Offending column. Empty when the backend did not name one.
    pub column: String,
    /// What was wrong with it.
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl ColumnViolation {
    /// Create a new column violation.
    pub fn new(column: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            column: column.into(),
            kind,
        }
    }
}

impl fmt::Display for ColumnViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.column.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.column, self.kind)
        }
    }
}

/// All violations found in one row of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowViolations {
    /// Position of the row within a bulk batch. `None` for single-row calls.
    pub row: Option<usize>,
    /// Every violated column of that row.
    pub violations: Vec<ColumnViolation>,
}

impl RowViolations {
    /// Violations for a single-row operation.
    pub fn single(violations: Vec<ColumnViolation>) -> Self {
        Self {
            row: None,
            violations,
        }
    }

    /// Violations for row `index` of a batch.
    pub fn at(index: usize, violations: Vec<ColumnViolation>) -> Self {
        Self {
            row: Some(index),
            violations,
        }
    }
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend is unreachable or failed mid-operation.
    #[error("connection error: {0}")]
    Connection(String),

    /// A table's structure could not be described.
    #[error("introspection error for `{table}`: {reason}")]
    Introspection {
        /// Table that was skipped.
        table: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The table is not part of the current catalog snapshot.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The subject's role does not permit the operation.
    #[error("subject `{subject}` is not allowed to {operation} on `{table}`")]
    Authorization {
        /// Acting subject.
        subject: String,
        /// Target table.
        table: String,
        /// Attempted operation.
        operation: Operation,
    },

    /// Filter, sort or page parameters are malformed or unsafe.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A row payload violates column constraints.
    #[error("validation failed for `{table}`: {}", summarize(.rows))]
    Validation {
        /// Target table.
        table: String,
        /// Violations grouped per row.
        rows: Vec<RowViolations>,
    },

    /// The targeted row does not exist.
    #[error("no row in `{table}` with key {key}")]
    NotFound {
        /// Target table.
        table: String,
        /// Key that was looked up.
        key: RowKey,
    },

    /// A bulk operation exceeds the configured size bound.
    #[error("batch of {size} rows exceeds the limit of {limit}")]
    BatchTooLarge {
        /// Rows in the batch.
        size: usize,
        /// Configured bound.
        limit: usize,
    },
}

fn summarize(rows: &[RowViolations]) -> String {
    rows.iter()
        .map(|r| {
            let cols = r
                .violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            match r.row {
                Some(index) => format!("row {}: {}", index, cols),
                None => cols,
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

impl Error {
    /// Classify a backend error raised while mutating `table`.
    ///
    /// Constraint failures are the row's fault and become `Validation`;
    /// anything else is treated as a lost or broken connection.
    pub fn from_backend(table: &str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let message = message.clone().unwrap_or_else(|| err.to_string());
                Error::Validation {
                    table: table.to_string(),
                    rows: vec![RowViolations::single(vec![constraint_violation(message)])],
                }
            }
            _ => Error::Connection(err.to_string()),
        }
    }

    /// Attach a batch row index to a single-row validation error.
    pub(crate) fn at_row(self, index: usize) -> Self {
        match self {
            Error::Validation { table, rows } => Error::Validation {
                table,
                rows: rows
                    .into_iter()
                    .map(|r| RowViolations::at(index, r.violations))
                    .collect(),
            },
            other => other,
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Connection(_) => "connection",
            Error::Introspection { .. } => "introspection",
            Error::UnknownTable(_) => "unknown_table",
            Error::Authorization { .. } => "authorization",
            Error::InvalidFilter(_) => "invalid_filter",
            Error::Validation { .. } => "validation",
            Error::NotFound { .. } => "not_found",
            Error::BatchTooLarge { .. } => "batch_too_large",
        }
    }

    /// HTTP-equivalent status for the presentation layer.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Connection(_) => 503,
            Error::Introspection { .. } => 500,
            Error::UnknownTable(_) => 404,
            Error::Authorization { .. } => 403,
            Error::InvalidFilter(_) => 400,
            Error::Validation { .. } => 422,
            Error::NotFound { .. } => 404,
            Error::BatchTooLarge { .. } => 413,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Connection(err.to_string())
    }
}

/// Build a constraint violation, pulling the column out of messages such as
/// `UNIQUE constraint failed: users.email`.
fn constraint_violation(message: String) -> ColumnViolation {
    let column = message
        .rsplit_once(": ")
        .map(|(_, target)| target.replace(", ", ","))
        .filter(|target| !target.contains(' '))
        .map(|target| {
            target
                .split(',')
                .map(|qualified| qualified.rsplit('.').next().unwrap_or(qualified))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    ColumnViolation::new(column, ViolationKind::Constraint { message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_statuses() {
        let err = Error::UnknownTable("ghosts".into());
        assert_eq!(err.code(), "unknown_table");
        assert_eq!(err.http_status(), 404);

        let err = Error::Authorization {
            subject: "bob".into(),
            table: "orders".into(),
            operation: Operation::Update,
        };
        assert_eq!(err.http_status(), 403);
        assert!(err.to_string().contains("bob"));
        assert!(err.to_string().contains("update"));

        let err = Error::BatchTooLarge { size: 10, limit: 5 };
        assert_eq!(err.http_status(), 413);
        assert!(!err.is_retryable());
        assert!(Error::Connection("gone".into()).is_retryable());
    }

    #[test]
    fn test_validation_display_lists_every_violation() {
        let err = Error::Validation {
            table: "employees".into(),
            rows: vec![
                RowViolations::at(
                    0,
                    vec![ColumnViolation::new("name", ViolationKind::Missing)],
                ),
                RowViolations::at(
                    3,
                    vec![
                        ColumnViolation::new("age", ViolationKind::NotNullable),
                        ColumnViolation::new("nickname", ViolationKind::UnknownColumn),
                    ],
                ),
            ],
        };

        let text = err.to_string();
        assert!(text.contains("row 0: name: required value missing"));
        assert!(text.contains("row 3: age: null not allowed; nickname: no such column"));
    }

    #[test]
    fn test_constraint_column_extraction() {
        let v = constraint_violation("UNIQUE constraint failed: users.email".into());
        assert_eq!(v.column, "email");

        let v = constraint_violation("UNIQUE constraint failed: t.a, t.b".into());
        assert_eq!(v.column, "a,b");

        let v = constraint_violation("FOREIGN KEY constraint failed".into());
        assert_eq!(v.column, "");
    }

    #[test]
    fn test_at_row_rewrites_single_row_violations() {
        let err = Error::Validation {
            table: "t".into(),
            rows: vec![RowViolations::single(vec![ColumnViolation::new(
                "x",
                ViolationKind::Missing,
            )])],
        }
        .at_row(7);

        match err {
            Error::Validation { rows, .. } => assert_eq!(rows[0].row, Some(7)),
            other => panic!("expected Validation, got {:?}", other),
        }
    }
}
