//! Authorization decisions.

use tracing::warn;

use super::{GrantSet, Operation, Role};
use crate::error::{Error, Result};

/// Decide whether `subject` may perform `operation` on `table`.
///
/// Returns the effective role on success. Audit-wide requests pass `*` as
/// the table, which only wildcard-table grants match.
pub fn authorize(
    grants: &GrantSet,
    subject: &str,
    table: &str,
    operation: Operation,
) -> Result<Role> {
    let role = grants.effective_role(subject, table);
    if role.permits(operation) {
        Ok(role)
    } else {
        warn!(
            subject = %subject,
            table = %table,
            operation = %operation,
            role = %role,
            "Access denied"
        );
        Err(Error::Authorization {
            subject: subject.to_string(),
            table: table.to_string(),
            operation,
        })
    }
}
