//! Offset pagination.

use serde::Serialize;

use crate::config::EngineConfig;

/// A requested page. Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number; 0 is treated as 1.
    pub number: usize,
    /// Rows per page; `None` uses the configured default.
    pub size: Option<usize>,
}

impl PageRequest {
    /// First page at the default size.
    pub fn first() -> Self {
        Self {
            number: 1,
            size: None,
        }
    }

    /// Page `number` at the default size.
    pub fn number(number: usize) -> Self {
        Self { number, size: None }
    }

    /// Page `number` of `size` rows.
    pub fn new(number: usize, size: usize) -> Self {
        Self {
            number,
            size: Some(size),
        }
    }

    /// Set the page size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Clamp the request against the engine configuration.
    pub fn resolve(&self, config: &EngineConfig) -> PageWindow {
        PageWindow {
            number: self.number.max(1),
            size: config.effective_page_size(self.size),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// A clamped page: the rows `[offset, offset + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Page number, at least 1.
    pub number: usize,
    /// Rows per page, at least 1.
    pub size: usize,
}

impl PageWindow {
    /// Number of rows skipped.
    pub fn offset(&self) -> usize {
        (self.number - 1).saturating_mul(self.size)
    }

    /// Maximum number of rows returned.
    pub fn limit(&self) -> usize {
        self.size
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Rows on this page; empty past the end.
    pub items: Vec<T>,
    /// Rows matching the query across all pages.
    pub total: u64,
    /// Page number.
    pub number: usize,
    /// Page size.
    pub size: usize,
}

impl<T> Page<T> {
    /// Assemble a page from a window.
    pub fn new(items: Vec<T>, total: u64, window: PageWindow) -> Self {
        Self {
            items,
            total,
            number: window.number,
            size: window.size,
        }
    }

    /// Number of pages needed for all matching rows.
    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.size.max(1) as u64)
    }

    /// Check if a later page has rows.
    pub fn has_next(&self) -> bool {
        (self.number as u64) < self.page_count()
    }

    /// Check if this page has no rows.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transform the items, keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            number: self.number,
            size: self.size,
        }
    }
}
