//! Core type definitions using newtype patterns for type safety.
//!
//! Row ids are distinct types per table, and statuses are closed enums stored
//! in their canonical text form.

mod alert;
mod identity;
mod ids;
mod scan;
mod status;

pub use alert::{Alert, AlertRule, RuleKey};
pub use identity::ResourceIdentity;
pub use ids::{AlertId, IdParseError, RuleId, ScanId};
pub use scan::{RuleResult, SecurityScanResult};
pub use status::{AlertStatus, CheckStatus, Severity};
