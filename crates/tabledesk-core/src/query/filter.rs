//! Filter specifications.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;
use crate::value::Value;

/// Comparison operator of a filter criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal; `eq null` matches NULL.
    Eq,
    /// Not equal; `neq null` matches non-NULL.
    Neq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Case-insensitive substring match on text.
    Contains,
    /// Member of a non-empty value set.
    In,
}

impl FilterOp {
    /// Every operator, in documentation order.
    pub const ALL: [FilterOp; 8] = [
        FilterOp::Eq,
        FilterOp::Neq,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Contains,
        FilterOp::In,
    ];

    /// Check if this is a range comparison.
    pub fn is_ordering(&self) -> bool {
        matches!(self, FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte)
    }

    /// Check if the operator takes a value list.
    pub fn takes_list(&self) -> bool {
        matches!(self, FilterOp::In)
    }

    /// Operator name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Contains => "contains",
            FilterOp::In => "in",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        FilterOp::ALL
            .into_iter()
            .find(|op| op.as_str() == lower)
            .ok_or_else(|| Error::InvalidFilter(format!("unknown operator '{}'", s)))
    }
}

/// Right-hand side of a criterion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterOperand {
    /// One value.
    Single(Value),
    /// A value set, for `in`.
    List(Vec<Value>),
}

/// One `(column, operator, value)` criterion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    /// Column the criterion applies to.
    pub column: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Value or value set.
    pub operand: FilterOperand,
}

/// An ordered conjunction of criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterSpec {
    criteria: Vec<Criterion>,
}

impl FilterSpec {
    /// Create an empty filter (matches every row).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a criterion.
    pub fn with(mut self, column: impl Into<String>, op: FilterOp, operand: FilterOperand) -> Self {
        self.push(column, op, operand);
        self
    }

    /// Append a criterion in place.
    pub fn push(&mut self, column: impl Into<String>, op: FilterOp, operand: FilterOperand) {
        self.criteria.push(Criterion {
            column: column.into(),
            op,
            operand,
        });
    }

    /// `column = value`.
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterOp::Eq, FilterOperand::Single(value.into()))
    }

    /// `column <> value`.
    pub fn neq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterOp::Neq, FilterOperand::Single(value.into()))
    }

    /// `column < value`.
    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterOp::Lt, FilterOperand::Single(value.into()))
    }

    /// `column <= value`.
    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterOp::Lte, FilterOperand::Single(value.into()))
    }

    /// `column > value`.
    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterOp::Gt, FilterOperand::Single(value.into()))
    }

    /// `column >= value`.
    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterOp::Gte, FilterOperand::Single(value.into()))
    }

    /// Case-insensitive substring match.
    pub fn contains(self, column: impl Into<String>, needle: impl Into<Value>) -> Self {
        self.with(column, FilterOp::Contains, FilterOperand::Single(needle.into()))
    }

    /// `column IN (values)`.
    pub fn is_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(column, FilterOp::In, FilterOperand::List(values))
    }

    /// Iterate over the criteria in order.
    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter()
    }

    /// Check if there are no criteria.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Number of criteria.
    pub fn len(&self) -> usize {
        self.criteria.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operators() {
        assert_eq!("eq".parse::<FilterOp>().unwrap(), FilterOp::Eq);
        assert_eq!("GTE".parse::<FilterOp>().unwrap(), FilterOp::Gte);
        assert_eq!(" contains ".parse::<FilterOp>().unwrap(), FilterOp::Contains);
        assert!(matches!(
            "like".parse::<FilterOp>(),
            Err(Error::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_builder_keeps_order() {
        let spec = FilterSpec::new()
            .eq("status", "open")
            .gte("total", 100)
            .is_in("region", ["eu", "us"]);

        let ops: Vec<_> = spec.iter().map(|c| (c.column.as_str(), c.op)).collect();
        assert_eq!(
            ops,
            vec![
                ("status", FilterOp::Eq),
                ("total", FilterOp::Gte),
                ("region", FilterOp::In)
            ]
        );
        assert_eq!(
            spec.iter().last().unwrap().operand,
            FilterOperand::List(vec![Value::from("eu"), Value::from("us")])
        );
    }
}
