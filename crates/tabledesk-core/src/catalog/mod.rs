//! Schema catalog for tabledesk.
//!
//! The catalog introspects the connected database and keeps an immutable
//! snapshot of every user table: its columns, their classified types, the
//! primary key and the foreign-key references.

mod catalog;
mod introspect;
mod table;
mod types;

pub use catalog::{SchemaCatalog, SchemaSnapshot};
pub use introspect::{introspect_table, load_schema};
pub use table::{ColumnDescriptor, ForeignKeyRef, TableDescriptor};
pub use types::ColumnType;
