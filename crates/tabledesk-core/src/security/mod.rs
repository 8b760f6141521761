//! Access policy for tabledesk.
//!
//! Every engine call names a subject, a table and an operation. The subject's
//! effective role on the table is resolved from an explicit `GrantSet` and
//! compared with the role the operation requires.
//!
//! # Example
//!
//! ```ignore
//! use tabledesk_core::security::{authorize, GrantSet, Operation};
//!
//! let grants = GrantSet::from_strings(&["alice:orders:editor", "*:orders:viewer"])?;
//! assert!(authorize(&grants, "alice", "orders", Operation::Update).is_ok());
//! assert!(authorize(&grants, "bob", "orders", Operation::Update).is_err());
//! ```

pub mod grant;
pub mod operation;
pub mod policy;
pub mod role;
pub mod store;

pub use grant::{AccessGrant, GrantScope, GrantSet, ParseGrantError};
pub use operation::Operation;
pub use policy::authorize;
pub use role::Role;
pub use store::GrantStore;
