//! CSV output formatting.

use crate::types::{Alert, AlertRule, SecurityScanResult};
use chrono::{DateTime, Utc};
use std::io::{self, Write};

fn ts(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn id<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One row per scan.
pub fn write_scans(out: impl Write, scans: &[SecurityScanResult]) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record([
        "id", "group", "version", "kind", "namespace", "name", "team", "status", "checked_at",
        "archived_at",
    ])?;

    for scan in scans {
        let r = &scan.resource;
        wtr.write_record([
            id(scan.id),
            r.group.clone(),
            r.version.clone(),
            r.kind.clone(),
            r.namespace.clone(),
            r.name.clone(),
            scan.team.clone(),
            scan.overall_status.to_string(),
            ts(Some(scan.checked_at)),
            ts(scan.archived_at),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// One row per rule result of `scan`.
pub fn write_rule_results(out: impl Write, scan: &SecurityScanResult) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(["scan_id", "rule_code", "status", "message", "checked_at"])?;

    for rule in &scan.rule_results {
        wtr.write_record([
            id(scan.id),
            rule.rule_code.clone(),
            rule.status.to_string(),
            rule.message.clone(),
            ts(Some(rule.checked_at)),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

const ALERT_HEADER: [&str; 8] = [
    "id",
    "rule_id",
    "fingerprint",
    "status",
    "summary",
    "labels",
    "created_at",
    "archived_at",
];

fn alert_record(alert: &Alert) -> [String; 8] {
    let labels: Vec<String> = alert.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    [
        id(alert.id),
        id(alert.rule_id),
        alert.fingerprint.clone(),
        alert.status.as_str().to_string(),
        alert.summary.clone(),
        labels.join(";"),
        ts(Some(alert.created_at)),
        ts(alert.archived_at),
    ]
}

/// One row per alert.
pub fn write_alerts(out: impl Write, alerts: &[Alert]) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(ALERT_HEADER)?;
    for alert in alerts {
        wtr.write_record(alert_record(alert))?;
    }

    wtr.flush()?;
    Ok(())
}

/// One row per alert, prefixed with its rule's columns.
pub fn write_rules(out: impl Write, rules: &[AlertRule]) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    let header = ["rule_name", "severity", "source", "team", "resource"]
        .into_iter()
        .chain(ALERT_HEADER);
    wtr.write_record(header)?;

    for rule in rules {
        let prefix = [
            rule.name.clone(),
            rule.severity.as_str().to_string(),
            rule.source.clone(),
            rule.team.clone(),
            rule.resource.to_string(),
        ];
        for alert in &rule.alerts {
            wtr.write_record(prefix.iter().cloned().chain(alert_record(alert)))?;
        }
    }

    wtr.flush()?;
    Ok(())
}
