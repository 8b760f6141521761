//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page a caller may request.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 1000;

/// Default bound on rows touched by one bulk operation.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Default time to wait on a locked database, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Where the backend database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Private in-memory database, gone when the engine drops.
    Memory,
    /// SQLite database file.
    File(PathBuf),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backend database location.
    pub location: DatabaseLocation,

    /// Create the database file if it does not exist.
    pub create_if_missing: bool,

    /// Page size used when a request does not name one.
    pub default_page_size: usize,

    /// Upper bound for requested page sizes.
    pub max_page_size: usize,

    /// Maximum rows per bulk insert or bulk delete.
    pub max_batch_size: usize,

    /// How long to wait on a locked database before failing.
    pub busy_timeout: Duration,

    /// Substring patterns; matching tables are hidden from the catalog.
    pub table_blocklist: Vec<String>,
}

impl EngineConfig {
    /// Create a configuration for the given location.
    pub fn new(location: DatabaseLocation) -> Self {
        Self {
            location,
            create_if_missing: false,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            table_blocklist: Vec::new(),
        }
    }

    /// Configuration for an existing database file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(DatabaseLocation::File(path.into()))
    }

    /// Configuration for a private in-memory database.
    pub fn memory() -> Self {
        Self::new(DatabaseLocation::Memory)
    }

    /// Allow creating the database file on open.
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Set the default page size.
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// Set the maximum page size.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size.max(1);
        self
    }

    /// Set the bulk operation bound.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Hide tables whose name contains `pattern`.
    pub fn with_blocked_table(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if !pattern.is_empty() {
            self.table_blocklist.push(pattern);
        }
        self
    }

    /// Set the blocklist from a comma-separated pattern list.
    pub fn with_table_blocklist(mut self, patterns: &str) -> Self {
        self.table_blocklist = patterns
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        self
    }

    /// Check whether a table is hidden by the blocklist.
    pub fn is_blocked(&self, table: &str) -> bool {
        self.table_blocklist.iter().any(|p| table.contains(p.as_str()))
    }

    /// Page size to use for a request, clamped to the configured bound.
    pub fn effective_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::memory()
    }
}
