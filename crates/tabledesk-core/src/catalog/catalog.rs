//! Catalog manager holding the current schema snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rusqlite::Connection;
use tracing::info;

use super::{load_schema, TableDescriptor};
use crate::error::{Error, Result};

/// An immutable view of the schema as of one load.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    version: u64,
    tables: BTreeMap<String, TableDescriptor>,
}

impl SchemaSnapshot {
    /// Create a snapshot from introspected tables.
    pub fn new(version: u64, tables: BTreeMap<String, TableDescriptor>) -> Self {
        Self { version, tables }
    }

    /// Load sequence number of this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get a table descriptor, failing with `UnknownTable`.
    pub fn table(&self, name: &str) -> Result<&TableDescriptor> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Get a table descriptor if present.
    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Iterate over all descriptors.
    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.values()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if the snapshot has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// The schema catalog.
///
/// Readers take an `Arc` snapshot and keep using it for the whole operation;
/// `refresh` swaps in a new snapshot without disturbing them.
pub struct SchemaCatalog {
    /// Current snapshot.
    current: RwLock<Arc<SchemaSnapshot>>,
    /// Number of completed loads.
    version: AtomicU64,
    /// Table name patterns hidden from the catalog.
    blocklist: Vec<String>,
}

impl SchemaCatalog {
    /// Introspect the database and build the first snapshot.
    pub fn load(conn: &Connection, blocklist: Vec<String>) -> Result<Self> {
        let catalog = Self {
            current: RwLock::new(Arc::new(SchemaSnapshot::default())),
            version: AtomicU64::new(0),
            blocklist,
        };
        catalog.refresh(conn)?;
        Ok(catalog)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Current load version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Describe a table from the current snapshot.
    pub fn describe_table(&self, name: &str) -> Result<TableDescriptor> {
        self.current.read().table(name).cloned()
    }

    /// Names of all tables in the current snapshot.
    pub fn list_tables(&self) -> Vec<String> {
        self.current
            .read()
            .table_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Re-introspect the database and replace the snapshot.
    ///
    /// On failure the previous snapshot stays in place. Returns the new
    /// version number.
    pub fn refresh(&self, conn: &Connection) -> Result<u64> {
        let tables = load_schema(conn, &self.blocklist)?;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = SchemaSnapshot::new(version, tables);
        info!(version, tables = snapshot.len(), "Schema catalog loaded");
        *self.current.write() = Arc::new(snapshot);
        Ok(version)
    }
}
