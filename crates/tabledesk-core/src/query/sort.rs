//! Sort specifications.

use serde::Serialize;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    /// Column to sort by.
    pub column: String,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Ordered list of sort keys. Ties are always broken by primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    /// No explicit ordering (primary key ascending).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an ascending key.
    pub fn asc(self, column: impl Into<String>) -> Self {
        self.by(column, SortDirection::Asc)
    }

    /// Append a descending key.
    pub fn desc(self, column: impl Into<String>) -> Self {
        self.by(column, SortDirection::Desc)
    }

    /// Append a key with the given direction.
    pub fn by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push(SortKey {
            column: column.into(),
            direction,
        });
        self
    }

    /// Iterate over the keys in order.
    pub fn iter(&self) -> impl Iterator<Item = &SortKey> {
        self.keys.iter()
    }

    /// Check if no key was given.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
