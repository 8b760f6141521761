//! Search criteria resolution.
//!
//! Turns loosely structured caller input (form fields, JSON, command-line
//! expressions) into `FilterSpec` and `SortSpec` values. Only structure is
//! checked here; column existence and type compatibility are checked by the
//! query builder against the table descriptor.

use serde::Deserialize;

use super::{FilterOp, FilterOperand, FilterSpec, SortDirection, SortSpec};
use crate::error::{Error, Result};
use crate::value::Value;

/// Unresolved criterion as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCriterion {
    /// Column name.
    pub column: String,
    /// Operator name.
    pub op: String,
    /// Value; an array or comma-separated string for `in`.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl RawCriterion {
    /// Create a raw criterion.
    pub fn new(
        column: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            column: column.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

/// Resolves raw criteria into filter and sort specifications.
pub struct FilterResolver;

impl FilterResolver {
    /// Resolve a list of raw criteria.
    pub fn parse(raw: &[RawCriterion]) -> Result<FilterSpec> {
        let mut spec = FilterSpec::new();
        for (index, criterion) in raw.iter().enumerate() {
            let column = criterion.column.trim();
            if column.is_empty() {
                return Err(Error::InvalidFilter(format!(
                    "criterion {}: empty column name",
                    index
                )));
            }
            let op: FilterOp = criterion.op.parse()?;
            let operand = Self::operand(column, op, &criterion.value)?;
            spec.push(column, op, operand);
        }
        Ok(spec)
    }

    /// Resolve criteria given as a JSON array of `{"column", "op", "value"}`.
    pub fn parse_json(text: &str) -> Result<FilterSpec> {
        let raw: Vec<RawCriterion> = serde_json::from_str(text)
            .map_err(|e| Error::InvalidFilter(format!("malformed criteria: {}", e)))?;
        Self::parse(&raw)
    }

    /// Parse a `column:op:value` expression. The literal `null` means NULL.
    pub fn parse_expr(expr: &str) -> Result<RawCriterion> {
        let mut parts = expr.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(column), Some(op), Some(value)) => {
                let value = match value {
                    "null" => serde_json::Value::Null,
                    text => serde_json::Value::String(text.to_string()),
                };
                Ok(RawCriterion::new(column, op, value))
            }
            _ => Err(Error::InvalidFilter(format!(
                "expected column:op:value, got '{}'",
                expr
            ))),
        }
    }

    /// Parse sort keys written as `column`, `column:asc` or `column:desc`.
    pub fn parse_sort<S: AsRef<str>>(keys: &[S]) -> Result<SortSpec> {
        let mut spec = SortSpec::new();
        for key in keys {
            let key = key.as_ref().trim();
            let (column, direction) = match key.rsplit_once(':') {
                Some((column, dir)) => {
                    let direction = match dir.to_ascii_lowercase().as_str() {
                        "asc" => SortDirection::Asc,
                        "desc" => SortDirection::Desc,
                        other => {
                            return Err(Error::InvalidFilter(format!(
                                "unknown sort direction '{}'",
                                other
                            )))
                        }
                    };
                    (column, direction)
                }
                None => (key, SortDirection::Asc),
            };
            if column.is_empty() {
                return Err(Error::InvalidFilter("empty sort column".into()));
            }
            spec = spec.by(column, direction);
        }
        Ok(spec)
    }

    fn operand(column: &str, op: FilterOp, value: &serde_json::Value) -> Result<FilterOperand> {
        let scalar = |json: &serde_json::Value| {
            Value::from_json(json)
                .map_err(|e| Error::InvalidFilter(format!("value for `{}`: {}", column, e)))
        };

        if op.takes_list() {
            let values = match value {
                serde_json::Value::Array(items) => {
                    items.iter().map(scalar).collect::<Result<Vec<_>>>()?
                }
                serde_json::Value::String(text) => text
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Value::from)
                    .collect(),
                serde_json::Value::Null => Vec::new(),
                other => vec![scalar(other)?],
            };
            if values.is_empty() {
                return Err(Error::InvalidFilter(format!(
                    "`in` on `{}` needs at least one value",
                    column
                )));
            }
            return Ok(FilterOperand::List(values));
        }

        match value {
            serde_json::Value::Array(_) => Err(Error::InvalidFilter(format!(
                "operator `{}` on `{}` takes a single value, not a list",
                op, column
            ))),
            other => Ok(FilterOperand::Single(scalar(other)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_criteria() {
        let spec = FilterResolver::parse(&[
            RawCriterion::new("status", "eq", "open"),
            RawCriterion::new("total", "gte", 100),
            RawCriterion::new("region", "in", json!(["eu", "us"])),
            RawCriterion::new("tag", "in", "a, b,,c"),
        ])
        .unwrap();

        let operands: Vec<_> = spec.iter().map(|c| c.operand.clone()).collect();
        assert_eq!(
            operands,
            vec![
                FilterOperand::Single(Value::from("open")),
                FilterOperand::Single(Value::Integer(100)),
                FilterOperand::List(vec![Value::from("eu"), Value::from("us")]),
                FilterOperand::List(vec![Value::from("a"), Value::from("b"), Value::from("c")]),
            ]
        );
    }

    #[test]
    fn test_rejects_malformed_criteria() {
        let cases = [
            RawCriterion::new(" ", "eq", 1),
            RawCriterion::new("a", "like", "x"),
            RawCriterion::new("a", "eq", json!([1, 2])),
            RawCriterion::new("a", "in", json!([])),
            RawCriterion::new("a", "in", ""),
            RawCriterion::new("a", "eq", json!({"nested": true})),
        ];
        for case in cases {
            assert!(
                matches!(FilterResolver::parse(&[case.clone()]), Err(Error::InvalidFilter(_))),
                "{:?}",
                case
            );
        }
    }

    #[test]
    fn test_parse_json() {
        let spec = FilterResolver::parse_json(
            r#"[{"column": "name", "op": "contains", "value": "ann"},
                {"column": "deleted_at", "op": "eq"}]"#,
        )
        .unwrap();
        assert_eq!(spec.len(), 2);
        assert_eq!(
            spec.iter().nth(1).unwrap().operand,
            FilterOperand::Single(Value::Null)
        );

        assert!(FilterResolver::parse_json("{not json").is_err());
    }

    #[test]
    fn test_parse_expr() {
        let raw = FilterResolver::parse_expr("note:contains:a:b").unwrap();
        assert_eq!(raw, RawCriterion::new("note", "contains", "a:b"));

        let raw = FilterResolver::parse_expr("closed_at:eq:null").unwrap();
        assert_eq!(raw.value, serde_json::Value::Null);

        assert!(FilterResolver::parse_expr("status=open").is_err());
    }

    #[test]
    fn test_parse_sort() {
        let spec = FilterResolver::parse_sort(&["name", "created_at:desc", "id:ASC"]).unwrap();
        let keys: Vec<_> = spec.iter().map(|k| (k.column.as_str(), k.direction)).collect();
        assert_eq!(
            keys,
            vec![
                ("name", SortDirection::Asc),
                ("created_at", SortDirection::Desc),
                ("id", SortDirection::Asc)
            ]
        );

        assert!(FilterResolver::parse_sort(&["name:sideways"]).is_err());
        assert!(FilterResolver::parse_sort(&[":desc"]).is_err());
    }
}
