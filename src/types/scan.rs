//! Security scan documents.

use super::{CheckStatus, ResourceIdentity, ScanId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compliance snapshot of one resource, with its rule-level results.
///
/// `archived_at == None` marks the current record for its resource identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScanResult {
    /// Assigned by the store; ignored on ingestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ScanId>,
    pub resource: ResourceIdentity,
    pub team: String,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub overall_status: CheckStatus,
    /// Empty on list queries; only `get_scan` loads them.
    #[serde(default)]
    pub rule_results: Vec<RuleResult>,
}

impl SecurityScanResult {
    /// Create a current scan with no rule results.
    pub fn new(
        resource: ResourceIdentity,
        team: impl Into<String>,
        overall_status: CheckStatus,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            resource,
            team: team.into(),
            checked_at,
            archived_at: None,
            overall_status,
            rule_results: Vec::new(),
        }
    }

    /// Append a rule result checked at the same time as the scan.
    pub fn with_rule(
        mut self,
        rule_code: impl Into<String>,
        status: CheckStatus,
        message: impl Into<String>,
    ) -> Self {
        self.rule_results.push(RuleResult {
            rule_code: rule_code.into(),
            status,
            message: message.into(),
            checked_at: self.checked_at,
        });
        self
    }

    /// Mark as an already-superseded record (backfill).
    pub fn archived(mut self, at: DateTime<Utc>) -> Self {
        self.archived_at = Some(at);
        self
    }

    pub fn is_current(&self) -> bool {
        self.archived_at.is_none()
    }

    /// Count rule results by status: (failures, warnings).
    pub fn failure_counts(&self) -> (usize, usize) {
        self.rule_results
            .iter()
            .fold((0, 0), |(f, w), r| match r.status {
                CheckStatus::Failure | CheckStatus::Error => (f + 1, w),
                CheckStatus::Warning => (f, w + 1),
                CheckStatus::Success => (f, w),
            })
    }
}

/// Result of a single compliance rule within a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub rule_code: String,
    pub status: CheckStatus,
    #[serde(default)]
    pub message: String,
    pub checked_at: DateTime<Utc>,
}
