//! Column type classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical type of a column, derived from its declared type text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Character data.
    Text,
    /// Whole numbers.
    Integer,
    /// Fractional numbers.
    Decimal,
    /// True/false, stored as 0/1.
    Boolean,
    /// Date and time.
    Timestamp,
    /// Raw bytes.
    Blob,
}

impl ColumnType {
    /// Classify a declared column type.
    ///
    /// Follows SQLite's affinity rules, with boolean and date/time names
    /// split out of the numeric affinity.
    pub fn classify(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return ColumnType::Text;
        }
        if upper.contains("INT") && !upper.contains("POINT") {
            ColumnType::Integer
        } else if upper.contains("BOOL") {
            ColumnType::Boolean
        } else if upper.contains("DATE") || upper.contains("TIME") {
            ColumnType::Timestamp
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnType::Text
        } else if upper.contains("BLOB") {
            ColumnType::Blob
        } else {
            ColumnType::Decimal
        }
    }

    /// Check if values of this type can be range-compared and sorted meaningfully.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, ColumnType::Boolean | ColumnType::Blob)
    }

    /// Check if this type supports substring search.
    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Text)
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Decimal)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Blob => "blob",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_declared_types() {
        let cases = [
            ("INTEGER", ColumnType::Integer),
            ("bigint", ColumnType::Integer),
            ("TINYINT(1)", ColumnType::Integer),
            ("VARCHAR(255)", ColumnType::Text),
            ("text", ColumnType::Text),
            ("", ColumnType::Text),
            ("BOOLEAN", ColumnType::Boolean),
            ("DATETIME", ColumnType::Timestamp),
            ("timestamp", ColumnType::Timestamp),
            ("DATE", ColumnType::Timestamp),
            ("BLOB", ColumnType::Blob),
            ("REAL", ColumnType::Decimal),
            ("NUMERIC(10,2)", ColumnType::Decimal),
            ("DOUBLE PRECISION", ColumnType::Decimal),
            ("FLOATING POINT", ColumnType::Decimal),
        ];

        for (declared, expected) in cases {
            assert_eq!(ColumnType::classify(declared), expected, "{}", declared);
        }
    }

    #[test]
    fn test_type_capabilities() {
        assert!(ColumnType::Text.is_text());
        assert!(ColumnType::Timestamp.is_ordered());
        assert!(!ColumnType::Boolean.is_ordered());
        assert!(!ColumnType::Blob.is_ordered());
        assert!(ColumnType::Decimal.is_numeric());
    }
}
