//! tabledesk core - schema-agnostic data access engine.
//!
//! This crate discovers the structure of a connected relational database at
//! runtime and exposes generic browse, search, insert, update and delete
//! operations over every discovered table. Each call is gated by a per-table
//! role policy and every mutation is recorded in an append-only audit trail
//! written in the same transaction as the data change.
//!
//! # Example
//!
//! ```ignore
//! use tabledesk_core::{Engine, EngineConfig, FilterSpec, PageRequest, SortSpec};
//!
//! let engine = Engine::open(EngineConfig::file("./shop.db"))?;
//! engine.grant("alice@example.com:orders:editor".parse()?)?;
//!
//! let page = engine.search(
//!     "alice@example.com",
//!     "orders",
//!     &FilterSpec::new().gte("total", 100),
//!     &SortSpec::new().desc("created_at"),
//!     PageRequest::first(),
//! )?;
//! ```

pub mod audit;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod mutation;
pub mod query;
pub mod security;
pub mod value;

pub use audit::{AuditImage, AuditOperation, AuditRecord, AuditRecorder, TableAuditRecorder};
pub use catalog::{
    ColumnDescriptor, ColumnType, ForeignKeyRef, SchemaCatalog, SchemaSnapshot, TableDescriptor,
};
pub use config::{DatabaseLocation, EngineConfig};
pub use engine::Engine;
pub use error::{ColumnViolation, Error, Result, RowViolations, ViolationKind};
pub use query::{
    FilterOp, FilterOperand, FilterResolver, FilterSpec, Page, PageRequest, PageWindow,
    QueryBuilder, RawCriterion, SortDirection, SortSpec, Statement,
};
pub use security::{
    authorize, AccessGrant, GrantScope, GrantSet, GrantStore, Operation, ParseGrantError, Role,
};
pub use value::{Row, RowKey, Value};

/// Table holding persisted access grants.
pub const GRANTS_TABLE: &str = "_tabledesk_grants";

/// Table holding audit records.
pub const AUDIT_TABLE: &str = "_tabledesk_audit";

/// Check whether a table name belongs to the engine rather than to the user.
pub fn is_reserved_table(name: &str) -> bool {
    name == GRANTS_TABLE || name == AUDIT_TABLE || name.starts_with("sqlite_")
}
