//! Versioned persistence for scans and alerts.
//!
//! Both stores share one SQLite [`Database`]. Writes are serialized through
//! immediate transactions; reads see committed state only.

mod alert_store;
mod compare;
mod database;
mod scan_store;
mod schema;

pub use alert_store::{AlertOutcome, AlertStore};
pub use compare::RuleComparison;
pub use database::Database;
pub use scan_store::{ScanOutcome, ScanStore};

use crate::error::{StoreResult, ValidationError};
use chrono::{DateTime, Utc};

/// Cutoff for a history purge, rejecting negative retention and unfiltered deletes.
fn purge_cutoff(retention: chrono::Duration, selective: bool) -> StoreResult<DateTime<Utc>> {
    if retention < chrono::Duration::zero() {
        return Err(ValidationError::InvalidField {
            field: "retention",
            reason: "must not be negative".to_string(),
        }
        .into());
    }
    if !selective {
        return Err(ValidationError::EmptyFilter.into());
    }
    Utc::now()
        .checked_sub_signed(retention)
        .ok_or_else(|| {
            ValidationError::InvalidField {
                field: "retention",
                reason: format!("{} days is out of range", retention.num_days()),
            }
            .into()
        })
}
