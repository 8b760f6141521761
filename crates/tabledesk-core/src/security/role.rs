//! Roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Operation, ParseGrantError};

/// Role of a subject on a table.
///
/// Ordered `None < Viewer < Editor < Auditor`. An auditor reads like a
/// viewer and may inspect the audit log, but cannot mutate rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// No access.
    None,
    /// Read-only access to rows.
    Viewer,
    /// Read and mutate rows.
    Editor,
    /// Read rows and the audit log.
    Auditor,
}

impl Role {
    /// Check whether this role may perform the operation.
    pub fn permits(&self, operation: Operation) -> bool {
        match operation.required_role() {
            Role::None => true,
            Role::Viewer => *self >= Role::Viewer,
            Role::Editor => *self == Role::Editor,
            Role::Auditor => *self == Role::Auditor,
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::None => "none",
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Auditor => "auditor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseGrantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Role::None),
            "viewer" => Ok(Role::Viewer),
            "editor" => Ok(Role::Editor),
            "auditor" => Ok(Role::Auditor),
            other => Err(ParseGrantError::UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::None < Role::Viewer);
        assert!(Role::Viewer < Role::Editor);
        assert!(Role::Editor < Role::Auditor);
    }

    #[test]
    fn test_permits() {
        assert!(Role::Viewer.permits(Operation::Browse));
        assert!(!Role::Viewer.permits(Operation::Insert));
        assert!(!Role::None.permits(Operation::View));

        assert!(Role::Editor.permits(Operation::Update));
        assert!(Role::Editor.permits(Operation::BulkDelete));
        assert!(!Role::Editor.permits(Operation::ViewAudit));

        assert!(Role::Auditor.permits(Operation::Search));
        assert!(Role::Auditor.permits(Operation::SearchAudit));
        assert!(!Role::Auditor.permits(Operation::Delete));
    }

    #[test]
    fn test_parse_role() {
        assert_eq!("Editor".parse::<Role>().unwrap(), Role::Editor);
        assert_eq!(" viewer ".parse::<Role>().unwrap(), Role::Viewer);
        assert!("admin".parse::<Role>().is_err());
    }
}
