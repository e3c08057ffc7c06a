//! Alert rules and their alert instances.

use super::{AlertId, AlertStatus, ResourceIdentity, RuleId, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A monitored condition on a resource.
///
/// Unique on `name + resource + source`. Those fields never change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    /// Assigned by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RuleId>,
    pub resource: ResourceIdentity,
    pub team: String,
    pub name: String,
    pub severity: Severity,
    pub source: String,
    #[serde(default)]
    pub summary: String,
    /// Alerts carried with the rule: the incoming alert for status updates,
    /// or the rule's history when listed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<Alert>,
}

impl AlertRule {
    pub fn new(
        resource: ResourceIdentity,
        team: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            resource,
            team: team.into(),
            name: name.into(),
            severity,
            source: source.into(),
            summary: String::new(),
            alerts: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Embed an alert, as carried by a status update payload.
    pub fn with_alert(mut self, alert: Alert) -> Self {
        self.alerts.push(alert);
        self
    }

    /// The rule's unique key.
    pub fn key(&self) -> RuleKey {
        RuleKey {
            name: self.name.clone(),
            resource: self.resource.clone(),
            source: self.source.clone(),
        }
    }
}

/// Natural key of an alert rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub name: String,
    pub resource: ResourceIdentity,
    pub source: String,
}

/// One observation of an alert rule's state.
///
/// `archived_at == None` marks a current alert. A rule's first alert is the
/// placeholder: empty fingerprint, status OK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AlertId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    /// Distinguishes concrete instances of the same rule, e.g. a failing pod.
    #[serde(default)]
    pub fingerprint: String,
    pub status: AlertStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        fingerprint: impl Into<String>,
        status: AlertStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            rule_id: None,
            fingerprint: fingerprint.into(),
            status,
            summary: String::new(),
            labels: BTreeMap::new(),
            archived_at: None,
            created_at,
        }
    }

    /// The OK seed row created together with a rule.
    pub fn placeholder(rule_id: RuleId, summary: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            rule_id: Some(rule_id),
            summary: summary.into(),
            ..Self::new("", AlertStatus::Ok, created_at)
        }
    }

    pub fn for_rule(mut self, rule_id: RuleId) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn is_current(&self) -> bool {
        self.archived_at.is_none()
    }

    pub fn is_placeholder(&self) -> bool {
        self.fingerprint.is_empty() && self.status == AlertStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_placeholder_shape() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let alert = Alert::placeholder(RuleId::new(3), "disk usage", at);
        assert!(alert.is_placeholder());
        assert!(alert.is_current());
        assert_eq!(alert.rule_id, Some(RuleId::new(3)));
    }

    #[test]
    fn test_rule_payload_deserialization() {
        let json = r#"{
            "resource": {"version": "v1", "kind": "Pod", "namespace": "shop", "name": "web-0"},
            "team": "payments",
            "name": "HighMemory",
            "severity": "critical",
            "source": "prometheus",
            "alerts": [{"fingerprint": "abc", "status": "Active",
                        "labels": {"pod": "web-0"}, "createdAt": "2024-03-01T12:00:00Z"}]
        }"#;
        let rule: AlertRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.alerts.len(), 1);
        assert_eq!(rule.alerts[0].labels["pod"], "web-0");
        assert_eq!(rule.key().source, "prometheus");
    }
}
