//! Operations gated by the access policy.

use std::fmt;

use serde::Serialize;

use super::Role;

/// An engine operation, as seen by the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Page through rows.
    Browse,
    /// Read one row by key.
    View,
    /// Filtered page of rows.
    Search,
    /// Read the table descriptor.
    Describe,
    /// Read pick-list values of a foreign-key column.
    Lookup,
    /// Insert one row.
    Insert,
    /// Update one row.
    Update,
    /// Delete one row.
    Delete,
    /// Insert a batch of rows.
    BulkInsert,
    /// Delete every row of a table.
    BulkDelete,
    /// Page through audit records.
    ViewAudit,
    /// Filtered page of audit records.
    SearchAudit,
}

impl Operation {
    /// Minimum role the operation requires.
    pub fn required_role(&self) -> Role {
        match self {
            Operation::Browse
            | Operation::View
            | Operation::Search
            | Operation::Describe
            | Operation::Lookup => Role::Viewer,
            Operation::Insert
            | Operation::Update
            | Operation::Delete
            | Operation::BulkInsert
            | Operation::BulkDelete => Role::Editor,
            Operation::ViewAudit | Operation::SearchAudit => Role::Auditor,
        }
    }

    /// Check if the operation changes rows.
    pub fn is_mutation(&self) -> bool {
        self.required_role() == Role::Editor
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Browse => "browse",
            Operation::View => "view",
            Operation::Search => "search",
            Operation::Describe => "describe",
            Operation::Lookup => "lookup",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::BulkInsert => "bulk_insert",
            Operation::BulkDelete => "bulk_delete",
            Operation::ViewAudit => "view_audit",
            Operation::SearchAudit => "search_audit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
