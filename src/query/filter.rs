//! Typed filter options for the scan and alert stores.
//!
//! Each store has its own options struct, so a filter the store cannot honor
//! does not compile. Options combine with `AND` semantics.

use super::Predicate;
use crate::types::{AlertStatus, CheckStatus, ResourceIdentity, RuleId, Severity};

/// Common surface of the per-store filters.
pub trait Filter {
    /// Row restriction, excluding the history limit.
    fn predicate(&self) -> Predicate;

    /// Maximum rows returned per group (resource or rule), newest first.
    fn history_limit(&self) -> Option<usize>;

    /// Whether the filter narrows rows beyond their archive state.
    ///
    /// Bulk deletes refuse filters that are not selective.
    fn is_selective(&self) -> bool;
}

/// Match on any subset of the resource identity fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFilter {
    pub group: Option<String>,
    pub version: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

impl IdentityFilter {
    pub fn is_empty(&self) -> bool {
        self.group.is_none()
            && self.version.is_none()
            && self.kind.is_none()
            && self.namespace.is_none()
            && self.name.is_none()
    }

    /// Add the set fields to `pred`, using the identity columns under `alias`.
    pub(crate) fn apply(&self, pred: &mut Predicate, alias: &str) {
        let fields = [
            ("res_group", &self.group),
            ("res_version", &self.version),
            ("res_kind", &self.kind),
            ("res_namespace", &self.namespace),
            ("res_name", &self.name),
        ];
        for (column, value) in fields {
            if let Some(value) = value {
                pred.equals(&format!("{alias}.{column}"), value.clone());
            }
        }
    }
}

impl From<&ResourceIdentity> for IdentityFilter {
    fn from(id: &ResourceIdentity) -> Self {
        Self {
            group: Some(id.group.clone()),
            version: Some(id.version.clone()),
            kind: Some(id.kind.clone()),
            namespace: Some(id.namespace.clone()),
            name: Some(id.name.clone()),
        }
    }
}

/// Which alert rows a status restriction applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMatch {
    /// Current rows whose status is in the list.
    Current(Vec<AlertStatus>),
    /// Rows in any archive state whose status is in the list.
    Any(Vec<AlertStatus>),
}

/// Filter options for scan queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub identity: IdentityFilter,
    pub team: Option<String>,
    pub statuses: Option<Vec<CheckStatus>>,
    pub latest_only: bool,
    pub history_limit: Option<usize>,
}

impl ScanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_identity(mut self, identity: impl Into<IdentityFilter>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.identity.namespace = Some(namespace.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.identity.kind = Some(kind.into());
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn with_status(self, status: CheckStatus) -> Self {
        self.with_any_status([status])
    }

    pub fn with_any_status(mut self, statuses: impl IntoIterator<Item = CheckStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn with_latest_only(mut self) -> Self {
        self.latest_only = true;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }
}

impl Filter for ScanFilter {
    fn predicate(&self) -> Predicate {
        let mut pred = Predicate::new();
        self.identity.apply(&mut pred, "s");
        if let Some(team) = &self.team {
            pred.equals("s.team", team.clone());
        }
        if let Some(statuses) = &self.statuses {
            pred.any_of("s.overall_status", statuses.iter().map(|s| s.as_str().to_string()));
        }
        if self.latest_only {
            pred.is_null("s.archived_at");
        }
        pred
    }

    fn history_limit(&self) -> Option<usize> {
        self.history_limit
    }

    fn is_selective(&self) -> bool {
        !self.identity.is_empty() || self.team.is_some() || self.statuses.is_some()
    }
}

/// Filter options for alert queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub rule_id: Option<RuleId>,
    pub identity: IdentityFilter,
    pub team: Option<String>,
    pub severities: Option<Vec<Severity>>,
    pub source: Option<String>,
    pub fingerprint: Option<String>,
    pub status: Option<StatusMatch>,
    pub latest_only: bool,
    pub history_limit: Option<usize>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule_id(mut self, rule_id: RuleId) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    pub fn with_resource_identity(mut self, identity: impl Into<IdentityFilter>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severities.get_or_insert_with(Vec::new).push(severity);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Current alerts in `status`.
    pub fn with_status(mut self, status: AlertStatus) -> Self {
        self.status = Some(StatusMatch::Current(vec![status]));
        self
    }

    /// Alerts that were in any of `statuses` at any point.
    pub fn with_any_status(mut self, statuses: impl IntoIterator<Item = AlertStatus>) -> Self {
        self.status = Some(StatusMatch::Any(statuses.into_iter().collect()));
        self
    }

    pub fn with_latest_only(mut self) -> Self {
        self.latest_only = true;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }
}

fn status_values(statuses: &[AlertStatus]) -> impl Iterator<Item = String> + '_ {
    statuses.iter().map(|s| s.as_str().to_string())
}

impl Filter for AlertFilter {
    fn predicate(&self) -> Predicate {
        let mut pred = Predicate::new();
        if let Some(rule_id) = self.rule_id {
            pred.equals("a.rule_id", rule_id.get());
        }
        self.identity.apply(&mut pred, "r");
        if let Some(team) = &self.team {
            pred.equals("r.team", team.clone());
        }
        if let Some(severities) = &self.severities {
            pred.any_of("r.severity", severities.iter().map(|s| s.as_str().to_string()));
        }
        if let Some(source) = &self.source {
            pred.equals("r.source", source.clone());
        }
        if let Some(fingerprint) = &self.fingerprint {
            pred.equals("a.fingerprint", fingerprint.clone());
        }
        match &self.status {
            Some(StatusMatch::Current(statuses)) => {
                pred.is_null("a.archived_at")
                    .any_of("a.status", status_values(statuses));
            }
            Some(StatusMatch::Any(statuses)) => {
                pred.any_of("a.status", status_values(statuses));
            }
            None => {}
        }
        if self.latest_only {
            pred.is_null("a.archived_at");
        }
        pred
    }

    fn history_limit(&self) -> Option<usize> {
        self.history_limit
    }

    fn is_selective(&self) -> bool {
        self.rule_id.is_some()
            || !self.identity.is_empty()
            || self.team.is_some()
            || self.severities.is_some()
            || self.source.is_some()
            || self.fingerprint.is_some()
            || self.status.is_some()
    }
}
