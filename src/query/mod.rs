//! Composable query restrictions.
//!
//! Filters are built per call from typed options and translated into a SQL
//! `WHERE` clause with bound parameters. Both stores use them for listing,
//! history and purge queries.

mod filter;
mod predicate;

pub use filter::{AlertFilter, Filter, IdentityFilter, ScanFilter, StatusMatch};
pub use predicate::Predicate;
