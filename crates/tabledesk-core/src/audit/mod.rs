//! Audit trail for tabledesk.
//!
//! Every mutated row yields exactly one `AuditRecord`, written through an
//! `AuditRecorder` inside the transaction that performs the mutation. The
//! audit table is append-only: triggers reject any update or delete.

mod record;
mod recorder;
mod trail;

pub use record::{AuditImage, AuditOperation, AuditRecord};
pub use recorder::{AuditRecorder, TableAuditRecorder};
pub use trail::{audit_descriptor, ensure_audit_table, query_audit};
