//! Output formatting module.
//!
//! Provides formatters for plain text, JSON, and CSV output of scans,
//! alerts and alert rules.

mod csv_format;
mod json_format;
mod plain;

pub use plain::{print_error, print_info, print_success, print_warning};

use crate::cli::OutputFormat;
use crate::types::{Alert, AlertRule, SecurityScanResult};
use std::io;

/// Print a list of scans.
pub fn print_scans(scans: &[SecurityScanResult], format: OutputFormat) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match format {
        OutputFormat::Plain => plain::write_scans(&mut out, scans),
        OutputFormat::Json => json_format::write_json(&mut out, scans),
        OutputFormat::Csv => csv_format::write_scans(out, scans),
    }
}

/// Print one scan with its rule results.
pub fn print_scan(scan: &SecurityScanResult, format: OutputFormat) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match format {
        OutputFormat::Plain => plain::write_scan_detail(&mut out, scan),
        OutputFormat::Json => json_format::write_json(&mut out, scan),
        OutputFormat::Csv => csv_format::write_rule_results(out, scan),
    }
}

/// Print a list of alerts.
pub fn print_alerts(alerts: &[Alert], format: OutputFormat) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match format {
        OutputFormat::Plain => plain::write_alerts(&mut out, alerts),
        OutputFormat::Json => json_format::write_json(&mut out, alerts),
        OutputFormat::Csv => csv_format::write_alerts(out, alerts),
    }
}

/// Print alert rules with their alerts.
pub fn print_rules(rules: &[AlertRule], format: OutputFormat) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match format {
        OutputFormat::Plain => plain::write_rules(&mut out, rules),
        OutputFormat::Json => json_format::write_json(&mut out, rules),
        OutputFormat::Csv => csv_format::write_rules(out, rules),
    }
}

/// Print one alert rule.
pub fn print_rule(rule: &AlertRule, format: OutputFormat) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match format {
        OutputFormat::Plain => plain::write_rule_detail(&mut out, rule),
        OutputFormat::Json => json_format::write_json(&mut out, rule),
        OutputFormat::Csv => csv_format::write_rules(out, std::slice::from_ref(rule)),
    }
}
