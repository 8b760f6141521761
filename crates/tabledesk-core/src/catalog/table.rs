//! Table and column descriptors.

use serde::Serialize;

use super::ColumnType;
use crate::error::{Error, Result};

/// Describes one column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Declared type as written in the schema.
    pub declared_type: String,
    /// Classified type.
    pub column_type: ColumnType,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Position in the primary key (1-based), `None` if not a key column.
    pub primary_key: Option<usize>,
    /// Whether the schema supplies a default value.
    pub has_default: bool,
    /// Whether the backend assigns the value (rowid alias, autoincrement).
    pub generated: bool,
}

impl ColumnDescriptor {
    /// Create a nullable, non-key column.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::classify(&declared_type),
            declared_type,
            nullable: true,
            primary_key: None,
            has_default: false,
            generated: false,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Make the column part of the primary key at the given position.
    pub fn primary_key(mut self, position: usize) -> Self {
        self.primary_key = Some(position);
        self.nullable = false;
        self
    }

    /// Mark the column as having a default.
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    /// Mark the column as backend-generated.
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Check if this column is part of the primary key.
    pub fn is_key(&self) -> bool {
        self.primary_key.is_some()
    }

    /// Check if an insert must supply this column.
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.has_default && !self.generated
    }
}

/// A foreign-key reference from one column to a column of another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyRef {
    /// Referencing column in this table.
    pub column: String,
    /// Referenced table.
    pub ref_table: String,
    /// Referenced column.
    pub ref_column: String,
}

/// Structural description of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
    /// Primary-key column names in key order.
    pub primary_key: Vec<String>,
    /// Foreign-key references.
    pub foreign_keys: Vec<ForeignKeyRef>,
}

impl TableDescriptor {
    /// Build a descriptor, deriving the key order from the columns.
    ///
    /// Fails when the table has no primary key or repeats a column name.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Result<Self> {
        let name = name.into();

        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::Introspection {
                    table: name,
                    reason: format!("duplicate column `{}`", column.name),
                });
            }
        }

        let mut keyed: Vec<_> = columns
            .iter()
            .filter_map(|c| c.primary_key.map(|pos| (pos, c.name.clone())))
            .collect();
        if keyed.is_empty() {
            return Err(Error::Introspection {
                table: name,
                reason: "table has no primary key".into(),
            });
        }
        keyed.sort();

        Ok(Self {
            name,
            columns,
            primary_key: keyed.into_iter().map(|(_, n)| n).collect(),
            foreign_keys: Vec::new(),
        })
    }

    /// Attach a foreign-key reference.
    pub fn with_foreign_key(
        mut self,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyRef {
            column: column.into(),
            ref_table: ref_table.into(),
            ref_column: ref_column.into(),
        });
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check if the table has a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// All column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns a caller may supply on insert; backend-generated ones are left out.
    pub fn insertable_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.generated).collect()
    }

    /// Columns an insert must supply.
    pub fn required_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_required()).collect()
    }

    /// Key columns in key order.
    pub fn key_columns(&self) -> Vec<&ColumnDescriptor> {
        self.primary_key
            .iter()
            .filter_map(|name| self.column(name))
            .collect()
    }

    /// Foreign-key reference of a column.
    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyRef> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}
