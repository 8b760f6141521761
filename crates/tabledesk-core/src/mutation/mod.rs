//! Row mutations for tabledesk.
//!
//! Payloads are validated against the table descriptor, written through
//! parameterized statements and audited in the same transaction.

mod executor;
mod validate;

pub use executor::MutationExecutor;
pub use validate::{validate_insert, validate_patch};
