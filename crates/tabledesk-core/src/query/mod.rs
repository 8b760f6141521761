//! Query construction for tabledesk.
//!
//! Caller criteria are resolved into a `FilterSpec`, validated against a
//! `TableDescriptor` and compiled into a parameterized `Statement`.

mod builder;
mod filter;
mod functions;
mod page;
mod resolver;
mod sort;

pub use builder::{quote_ident, QueryBuilder, Statement};
pub use filter::{Criterion, FilterOp, FilterOperand, FilterSpec};
pub use functions::{register_functions, CASEFOLD_FUNCTION};
pub use page::{Page, PageRequest, PageWindow};
pub use resolver::{FilterResolver, RawCriterion};
pub use sort::{SortDirection, SortKey, SortSpec};
