//! Plain text output formatting.
//!
//! Produces human-readable output with colors and formatting.

use crate::types::{Alert, AlertRule, AlertStatus, CheckStatus, SecurityScanResult, Severity};
use chrono::{DateTime, Utc};
use console::{style, Style};
use std::io::{self, Write};

const HEAVY_RULE: &str = "═══════════════════════════════════════════════════════════════";
const LIGHT_RULE: &str = "───────────────────────────────────────────────────────────────";

fn check_style(status: CheckStatus) -> Style {
    match status {
        CheckStatus::Success => Style::new().green(),
        CheckStatus::Warning => Style::new().yellow(),
        CheckStatus::Failure => Style::new().red().bold(),
        CheckStatus::Error => Style::new().magenta().bold(),
    }
}

fn alert_style(status: AlertStatus) -> Style {
    match status {
        AlertStatus::Ok => Style::new().green(),
        AlertStatus::Active => Style::new().red().bold(),
        AlertStatus::Silenced => Style::new().dim(),
    }
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Info => Style::new().blue(),
        Severity::Warning => Style::new().yellow(),
        Severity::Critical => Style::new().red().bold(),
    }
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn archived(ts: Option<DateTime<Utc>>) -> String {
    ts.map(timestamp).unwrap_or_else(|| "current".to_string())
}

fn banner(out: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", style(HEAVY_RULE).cyan())?;
    writeln!(out, "  {} {}", style("Lookout").cyan().bold(), title)?;
    writeln!(out, "{}", style(HEAVY_RULE).cyan())?;
    writeln!(out)
}

fn footer(out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", style(HEAVY_RULE).cyan())?;
    writeln!(out)
}

/// Table of scans, one line each.
pub fn write_scans(out: &mut impl Write, scans: &[SecurityScanResult]) -> io::Result<()> {
    if scans.is_empty() {
        return writeln!(out, "  {}", style("No scans to display.").dim());
    }

    writeln!(out, "  {}", style(LIGHT_RULE).dim())?;
    writeln!(
        out,
        "  {:>6}  {:<40}  {:<12}  {:^9}  {:<19}  {}",
        style("ID").bold(),
        style("RESOURCE").bold(),
        style("TEAM").bold(),
        style("STATUS").bold(),
        style("CHECKED").bold(),
        style("ARCHIVED").bold()
    )?;
    writeln!(out, "  {}", style(LIGHT_RULE).dim())?;

    for scan in scans {
        writeln!(
            out,
            "  {:>6}  {:<40}  {:<12}  {:^9}  {:<19}  {}",
            scan.id.map(|id| id.to_string()).unwrap_or_default(),
            truncate_string(&scan.resource.to_string(), 40),
            truncate_string(&scan.team, 12),
            check_style(scan.overall_status).apply_to(scan.overall_status),
            timestamp(scan.checked_at),
            style(archived(scan.archived_at)).dim()
        )?;
    }

    writeln!(out, "  {}", style(LIGHT_RULE).dim())?;
    writeln!(out, "  {} scan(s)", scans.len())
}

/// One scan with its rule results.
pub fn write_scan_detail(out: &mut impl Write, scan: &SecurityScanResult) -> io::Result<()> {
    let id = scan.id.map(|id| id.to_string()).unwrap_or_default();
    banner(out, &format!("Scan {id}"))?;

    writeln!(out, "  {} {}", style("Resource:").bold(), scan.resource)?;
    writeln!(out, "  {} {}", style("Team:").bold(), scan.team)?;
    writeln!(
        out,
        "  {} {}",
        style("Status:").bold(),
        check_style(scan.overall_status).apply_to(scan.overall_status)
    )?;
    writeln!(out, "  {} {}", style("Checked:").bold(), timestamp(scan.checked_at))?;
    writeln!(out, "  {} {}", style("Archived:").bold(), archived(scan.archived_at))?;
    writeln!(out)?;

    let (failures, warnings) = scan.failure_counts();
    writeln!(
        out,
        "  {} {} rule(s): {} failing, {} warning",
        style("Rules:").bold(),
        scan.rule_results.len(),
        style(failures).red().bold(),
        style(warnings).yellow()
    )?;

    if !scan.rule_results.is_empty() {
        writeln!(out, "  {}", style(LIGHT_RULE).dim())?;
        writeln!(
            out,
            "  {:<16}  {:^9}  {}",
            style("RULE").bold(),
            style("STATUS").bold(),
            style("MESSAGE").bold()
        )?;
        writeln!(out, "  {}", style(LIGHT_RULE).dim())?;
        for rule in &scan.rule_results {
            writeln!(
                out,
                "  {:<16}  {:^9}  {}",
                rule.rule_code,
                check_style(rule.status).apply_to(rule.status),
                truncate_string(&rule.message, 60)
            )?;
        }
        writeln!(out, "  {}", style(LIGHT_RULE).dim())?;
    }

    footer(out)
}

fn write_alert_rows(out: &mut impl Write, alerts: &[Alert], indent: &str) -> io::Result<()> {
    for alert in alerts {
        let fingerprint = if alert.fingerprint.is_empty() {
            style("(placeholder)".to_string()).dim()
        } else {
            style(truncate_string(&alert.fingerprint, 20))
        };
        writeln!(
            out,
            "{indent}{:>6}  {:>6}  {:<20}  {:^8}  {:<19}  {:<19}  {}",
            alert.id.map(|id| id.to_string()).unwrap_or_default(),
            alert.rule_id.map(|id| id.to_string()).unwrap_or_default(),
            fingerprint,
            alert_style(alert.status).apply_to(alert.status),
            timestamp(alert.created_at),
            archived(alert.archived_at),
            truncate_string(&alert.summary, 40)
        )?;
    }
    Ok(())
}

fn write_alert_header(out: &mut impl Write, indent: &str) -> io::Result<()> {
    writeln!(
        out,
        "{indent}{:>6}  {:>6}  {:<20}  {:^8}  {:<19}  {:<19}  {}",
        style("ID").bold(),
        style("RULE").bold(),
        style("FINGERPRINT").bold(),
        style("STATUS").bold(),
        style("CREATED").bold(),
        style("ARCHIVED").bold(),
        style("SUMMARY").bold()
    )
}

/// Table of alerts, one line each.
pub fn write_alerts(out: &mut impl Write, alerts: &[Alert]) -> io::Result<()> {
    if alerts.is_empty() {
        return writeln!(out, "  {}", style("No alerts to display.").dim());
    }

    writeln!(out, "  {}", style(LIGHT_RULE).dim())?;
    write_alert_header(out, "  ")?;
    writeln!(out, "  {}", style(LIGHT_RULE).dim())?;
    write_alert_rows(out, alerts, "  ")?;
    writeln!(out, "  {}", style(LIGHT_RULE).dim())?;
    writeln!(out, "  {} alert(s)", alerts.len())
}

fn write_rule_heading(out: &mut impl Write, rule: &AlertRule) -> io::Result<()> {
    writeln!(
        out,
        "  {} {} {} {} ({}, team {})",
        style(format!("#{}", rule.id.map(|id| id.to_string()).unwrap_or_default())).dim(),
        style(&rule.name).bold(),
        severity_style(rule.severity).apply_to(format!("[{}]", rule.severity)),
        rule.resource,
        rule.source,
        rule.team
    )
}

/// Rules, each followed by its alerts.
pub fn write_rules(out: &mut impl Write, rules: &[AlertRule]) -> io::Result<()> {
    if rules.is_empty() {
        return writeln!(out, "  {}", style("No alert rules to display.").dim());
    }

    for rule in rules {
        write_rule_heading(out, rule)?;
        write_alert_rows(out, &rule.alerts, "      ")?;
        writeln!(out)?;
    }
    writeln!(out, "  {} rule(s)", rules.len())
}

/// One rule with its alerts and their labels.
pub fn write_rule_detail(out: &mut impl Write, rule: &AlertRule) -> io::Result<()> {
    let id = rule.id.map(|id| id.to_string()).unwrap_or_default();
    banner(out, &format!("Alert Rule {id}"))?;

    writeln!(out, "  {} {}", style("Name:").bold(), rule.name)?;
    writeln!(
        out,
        "  {} {}",
        style("Severity:").bold(),
        severity_style(rule.severity).apply_to(rule.severity)
    )?;
    writeln!(out, "  {} {}", style("Resource:").bold(), rule.resource)?;
    writeln!(out, "  {} {}", style("Source:").bold(), rule.source)?;
    writeln!(out, "  {} {}", style("Team:").bold(), rule.team)?;
    if !rule.summary.is_empty() {
        writeln!(out, "  {} {}", style("Summary:").bold(), rule.summary)?;
    }
    writeln!(out)?;

    write_alerts(out, &rule.alerts)?;
    for alert in rule.alerts.iter().filter(|a| !a.labels.is_empty()) {
        let labels: Vec<String> = alert.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        writeln!(
            out,
            "  {} {}",
            style(format!("labels of {}:", alert.id.map(|id| id.to_string()).unwrap_or_default())).dim(),
            labels.join(", ")
        )?;
    }

    footer(out)
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info message.
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Truncate a string to a maximum length, adding ellipsis if truncated.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertId, ResourceIdentity, RuleId, ScanId};
    use chrono::TimeZone;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        console::strip_ansi_codes(&String::from_utf8(buf).unwrap()).into_owned()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("ééééé", 4), "é...");
    }

    #[test]
    fn test_scan_detail_lists_rules() {
        let mut scan = SecurityScanResult::new(
            ResourceIdentity::new("apps", "v1", "Deployment", "shop", "web"),
            "payments",
            CheckStatus::Failure,
            at(),
        )
        .with_rule("SEC-001", CheckStatus::Failure, "runs as root");
        scan.id = Some(ScanId::new(4));

        let text = render(|out| write_scan_detail(out, &scan));
        assert!(text.contains("Scan 4"));
        assert!(text.contains("apps/v1 Deployment shop/web"));
        assert!(text.contains("SEC-001"));
        assert!(text.contains("1 failing, 0 warning"));
    }

    #[test]
    fn test_empty_tables() {
        assert!(render(|out| write_scans(out, &[])).contains("No scans to display."));
        assert!(render(|out| write_alerts(out, &[])).contains("No alerts to display."));
        assert!(render(|out| write_rules(out, &[])).contains("No alert rules to display."));
    }

    #[test]
    fn test_placeholder_is_marked() {
        let mut alert = Alert::placeholder(RuleId::new(2), "", at());
        alert.id = Some(AlertId::new(9));
        let text = render(|out| write_alerts(out, &[alert]));
        assert!(text.contains("(placeholder)"));
        assert!(text.contains("current"));
        assert!(text.contains("1 alert(s)"));
    }
}
