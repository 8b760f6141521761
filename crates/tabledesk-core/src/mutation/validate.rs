//! Row payload validation.
//!
//! Payloads are checked column by column and every problem is collected, so
//! a caller sees the full list of violations at once instead of fixing them
//! one round trip at a time.

use crate::catalog::{ColumnDescriptor, TableDescriptor};
use crate::error::{ColumnViolation, ViolationKind};
use crate::value::{Row, Value};

/// Validate and coerce a row for insertion.
///
/// Required columns must be present and non-null. A null for a generated
/// column is dropped so the backend assigns the value.
pub fn validate_insert(table: &TableDescriptor, row: Row) -> Result<Row, Vec<ColumnViolation>> {
    let mut violations = unknown_columns(table, &row);
    let mut out = Row::new();

    for column in &table.columns {
        match row.get(&column.name) {
            None => {
                if column.is_required() {
                    violations.push(ColumnViolation::new(&column.name, ViolationKind::Missing));
                }
            }
            Some(Value::Null) if column.generated => {}
            Some(Value::Null) if !column.nullable => {
                violations.push(ColumnViolation::new(&column.name, ViolationKind::NotNullable));
            }
            Some(value) => match coerce(column, value.clone()) {
                Ok(value) => {
                    out.insert(column.name.clone(), value);
                }
                Err(violation) => violations.push(violation),
            },
        }
    }

    if violations.is_empty() {
        Ok(out)
    } else {
        Err(violations)
    }
}

/// Validate and coerce a partial update against the current row.
///
/// Key columns may appear only with their current value; such entries are
/// dropped from the returned patch.
pub fn validate_patch(
    table: &TableDescriptor,
    patch: Row,
    current: &Row,
) -> Result<Row, Vec<ColumnViolation>> {
    let mut violations = unknown_columns(table, &patch);
    let mut out = Row::new();

    for column in &table.columns {
        let Some(value) = patch.get(&column.name) else {
            continue;
        };
        if value.is_null() && !column.nullable {
            violations.push(ColumnViolation::new(&column.name, ViolationKind::NotNullable));
            continue;
        }
        let value = match coerce(column, value.clone()) {
            Ok(value) => value,
            Err(violation) => {
                violations.push(violation);
                continue;
            }
        };
        if column.is_key() {
            if current.get(&column.name) != Some(&value) {
                violations.push(ColumnViolation::new(
                    &column.name,
                    ViolationKind::PrimaryKeyImmutable,
                ));
            }
            continue;
        }
        out.insert(column.name.clone(), value);
    }

    if violations.is_empty() {
        Ok(out)
    } else {
        Err(violations)
    }
}

fn unknown_columns(table: &TableDescriptor, row: &Row) -> Vec<ColumnViolation> {
    row.columns()
        .filter(|name| !table.has_column(name))
        .map(|name| ColumnViolation::new(name, ViolationKind::UnknownColumn))
        .collect()
}

fn coerce(column: &ColumnDescriptor, value: Value) -> Result<Value, ColumnViolation> {
    value.coerce(column.column_type).map_err(|reason| {
        ColumnViolation::new(
            &column.name,
            ViolationKind::TypeMismatch {
                expected: column.column_type.to_string(),
                reason,
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn employees() -> TableDescriptor {
        TableDescriptor::new(
            "employees",
            vec![
                ColumnDescriptor::new("id", "INTEGER").primary_key(1).generated(),
                ColumnDescriptor::new("name", "TEXT").not_null(),
                ColumnDescriptor::new("age", "INTEGER").not_null(),
                ColumnDescriptor::new("active", "BOOLEAN").not_null().with_default(),
                ColumnDescriptor::new("nickname", "TEXT"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_insert_coerces_values() {
        let row = Row::new()
            .with("id", Value::Null)
            .with("name", "Ann")
            .with("age", "41")
            .with("active", "yes");

        let out = validate_insert(&employees(), row).unwrap();
        assert_eq!(
            out,
            Row::new()
                .with("name", "Ann")
                .with("age", 41)
                .with("active", true)
        );
    }

    #[test]
    fn test_insert_lists_every_violation() {
        let row = Row::new()
            .with("age", "old")
            .with("active", Value::Null)
            .with("shoe_size", 44);

        let violations = validate_insert(&employees(), row).unwrap_err();
        assert_eq!(
            violations,
            vec![
                ColumnViolation::new("shoe_size", ViolationKind::UnknownColumn),
                ColumnViolation::new("name", ViolationKind::Missing),
                ColumnViolation::new(
                    "age",
                    ViolationKind::TypeMismatch {
                        expected: "integer".into(),
                        reason: "'old' is not an integer".into(),
                    }
                ),
                ColumnViolation::new("active", ViolationKind::NotNullable),
            ]
        );
    }

    #[test]
    fn test_patch_rejects_key_changes() {
        let current = Row::new().with("id", 5).with("name", "Ann").with("age", 41);

        let patch = Row::new().with("id", "5").with("age", 42);
        let out = validate_patch(&employees(), patch, &current).unwrap();
        assert_eq!(out, Row::new().with("age", 42));

        let patch = Row::new().with("id", 6).with("name", Value::Null);
        let violations = validate_patch(&employees(), patch, &current).unwrap_err();
        assert_eq!(
            violations,
            vec![
                ColumnViolation::new("id", ViolationKind::PrimaryKeyImmutable),
                ColumnViolation::new("name", ViolationKind::NotNullable),
            ]
        );
    }

    #[test]
    fn test_patch_allows_clearing_nullable_columns() {
        let current = Row::new().with("id", 5).with("nickname", "A");
        let patch = Row::new().with("nickname", Value::Null);
        let out = validate_patch(&employees(), patch, &current).unwrap();
        assert_eq!(out, Row::new().with("nickname", Value::Null));
    }
}
