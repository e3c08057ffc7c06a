//! # Lookout - Versioned Storage for Scan Results and Alerts
//!
//! Lookout keeps the history of externally produced observations: security
//! scan results for cluster resources, and alert instances fired by
//! monitoring rules. Repeated identical observations collapse into a single
//! current record; a change archives the previous record and stores the new
//! one, so the full timeline stays queryable.
//!
//! ## Features
//!
//! - **Scan versioning**: one current scan per resource identity, with
//!   refresh-in-place for unchanged content and backfill of historical scans
//! - **Alert lifecycle**: rules seeded with an OK placeholder, per-fingerprint
//!   alert history, and invariant checks that abort rather than guess
//! - **Typed filters**: per-store filter options compiled into SQL
//! - **Safe concurrency**: immediate SQLite transactions, optimistic guards
//!   and bounded retries
//! - **Multiple Output Formats**: Plain text, JSON, and CSV
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lookout::query::ScanFilter;
//! use lookout::storage::{Database, ScanStore};
//! use lookout::types::{CheckStatus, ResourceIdentity, SecurityScanResult};
//! use std::sync::Arc;
//!
//! let db = Arc::new(Database::open_in_memory()?);
//! let store = ScanStore::new(db);
//!
//! let web = ResourceIdentity::new("apps", "v1", "Deployment", "shop", "web");
//! let scan = SecurityScanResult::new(web.clone(), "payments", CheckStatus::Failure, chrono::Utc::now())
//!     .with_rule("SEC-001", CheckStatus::Failure, "container runs as root");
//!
//! let outcome = store.store_scan(&scan)?;
//! println!("stored scan {}", outcome.scan_id());
//!
//! let failing = store.list_scans(true, &ScanFilter::new().with_status(CheckStatus::Failure))?;
//! assert_eq!(failing.len(), 1);
//! # Ok::<(), lookout::error::StoreError>(())
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`types`] - Core type definitions with newtype patterns for type safety
//! - [`query`] - Typed filter options and the SQL predicate builder
//! - [`storage`] - The scan and alert stores over SQLite
//! - [`config`] - Settings management
//! - [`logging`] - Structured logging setup
//! - [`error`] - Comprehensive error types
//! - [`output`] - Output formatting utilities

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod query;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, StoreError, ValidationError};
pub use storage::{AlertStore, Database, ScanStore};
pub use types::{Alert, AlertRule, ResourceIdentity, SecurityScanResult};
