//! Alerts subcommand implementation.
//!
//! Handles `lookout alerts` for recording alert rule payloads and browsing
//! alert history.

use super::{parse_id, read_documents, Context, IdentityArgs};
use crate::error::{CliError, CliResult};
use crate::output;
use crate::query::AlertFilter;
use crate::storage::AlertStore;
use crate::types::{AlertRule, AlertStatus, RuleId, Severity};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Store and query alert rules and alerts.
#[derive(Parser, Debug)]
pub struct AlertsCommand {
    #[command(subcommand)]
    pub action: AlertsAction,
}

/// Alert actions.
#[derive(Subcommand, Debug)]
pub enum AlertsAction {
    /// Record alert rule payloads from a JSON file or stdin
    ///
    /// A payload with one embedded alert updates the rule's status; a payload
    /// without alerts only registers the rule.
    Ingest {
        /// File holding one rule payload or an array of them ("-" for stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// List alerts
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        filter: AlertFilterArgs,
    },

    /// List alert rules with their matching alerts
    Rules {
        #[command(flatten)]
        filter: AlertFilterArgs,
    },

    /// Show an alert rule and its current alerts
    Show {
        /// Rule ID
        id: String,
    },

    /// Delete archived alerts older than the retention period
    Purge {
        /// Retention in days (defaults to the configured value)
        #[arg(long, value_name = "DAYS")]
        older_than: Option<u32>,

        #[command(flatten)]
        filter: AlertFilterArgs,
    },
}

/// Alert filter flags.
#[derive(Args, Debug, Clone, Default)]
pub struct AlertFilterArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Rule ID
    #[arg(long, value_name = "ID")]
    pub rule: Option<String>,

    /// Owning team
    #[arg(long)]
    pub team: Option<String>,

    /// Rule severity (repeatable)
    #[arg(long = "severity", value_name = "SEVERITY")]
    pub severities: Vec<Severity>,

    /// Rule source, e.g. "prometheus"
    #[arg(long)]
    pub source: Option<String>,

    /// Alert fingerprint
    #[arg(long)]
    pub fingerprint: Option<String>,

    /// Alert status (repeatable); matches current alerts unless --ever is set
    #[arg(long = "status", value_name = "STATUS")]
    pub statuses: Vec<AlertStatus>,

    /// Match --status against archived alerts too
    #[arg(long, requires = "statuses")]
    pub ever: bool,

    /// Only current alerts
    #[arg(long)]
    pub latest: bool,

    /// Maximum alerts per rule, newest first
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,
}

impl AlertFilterArgs {
    pub fn to_filter(&self) -> CliResult<AlertFilter> {
        let mut filter = AlertFilter::new().with_resource_identity(self.identity.filter()?);
        if let Some(rule) = &self.rule {
            filter = filter.with_rule_id(parse_id::<RuleId>(rule)?);
        }
        if let Some(team) = &self.team {
            filter = filter.with_team(team.clone());
        }
        for severity in &self.severities {
            filter = filter.with_severity(*severity);
        }
        if let Some(source) = &self.source {
            filter = filter.with_source(source.clone());
        }
        if let Some(fingerprint) = &self.fingerprint {
            filter = filter.with_fingerprint(fingerprint.clone());
        }
        match self.statuses.as_slice() {
            [] => {}
            [status] if !self.ever => filter = filter.with_status(*status),
            statuses if self.ever => filter = filter.with_any_status(statuses.iter().copied()),
            statuses => {
                filter = filter
                    .with_any_status(statuses.iter().copied())
                    .with_latest_only()
            }
        }
        if self.latest {
            filter = filter.with_latest_only();
        }
        if let Some(limit) = self.limit {
            filter = filter.with_history_limit(limit);
        }
        Ok(filter)
    }
}

/// Tally of ingest outcomes.
#[derive(Debug, Default, PartialEq, Eq)]
struct IngestSummary {
    registered: usize,
    changed: usize,
    unchanged: usize,
    failed: usize,
}

impl IngestSummary {
    fn message(&self) -> String {
        format!(
            "{} rule(s) registered, {} alert(s) changed, {} unchanged",
            self.registered, self.changed, self.unchanged
        )
    }
}

impl AlertsCommand {
    /// Execute the alerts command.
    pub fn execute(&self, ctx: &Context<'_>) -> CliResult<()> {
        match &self.action {
            AlertsAction::Ingest { file } => self.ingest(ctx, file.as_deref()),
            AlertsAction::List { filter } => {
                let alerts = store(ctx)?.list_alerts(&filter.to_filter()?)?;
                output::print_alerts(&alerts, ctx.format)?;
                Ok(())
            }
            AlertsAction::Rules { filter } => {
                let rules = store(ctx)?.list_rules(&filter.to_filter()?)?;
                output::print_rules(&rules, ctx.format)?;
                Ok(())
            }
            AlertsAction::Show { id } => {
                let rule = store(ctx)?.get_rule(parse_id::<RuleId>(id)?)?;
                output::print_rule(&rule, ctx.format)?;
                Ok(())
            }
            AlertsAction::Purge { older_than, filter } => {
                let days = older_than.unwrap_or(ctx.settings.alert_retention_days);
                let purged = store(ctx)?
                    .purge_history(chrono::Duration::days(i64::from(days)), &filter.to_filter()?)?;
                if !ctx.quiet {
                    output::print_success(&format!(
                        "Purged {purged} archived alert(s) older than {days} day(s)"
                    ));
                }
                Ok(())
            }
        }
    }

    fn ingest(&self, ctx: &Context<'_>, file: Option<&Path>) -> CliResult<()> {
        let rules: Vec<AlertRule> = read_documents(file)?;
        let store = store(ctx)?;

        let mut summary = IngestSummary::default();
        for (index, rule) in rules.iter().enumerate() {
            let result = if rule.alerts.is_empty() {
                store.ensure_rule(rule).map(|_| summary.registered += 1)
            } else {
                store.update_rule_status(rule).map(|outcome| {
                    if outcome.is_change() {
                        summary.changed += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                })
            };
            if let Err(err) = result {
                summary.failed += 1;
                output::print_error(&format!("document {index} ({}): {err}", rule.name));
            }
        }

        if summary.failed > 0 {
            return Err(CliError::InvalidInput(format!(
                "{} of {} payload(s) failed; {}",
                summary.failed,
                rules.len(),
                summary.message()
            )));
        }
        if !ctx.quiet {
            output::print_success(&summary.message());
        }
        Ok(())
    }
}

fn store(ctx: &Context<'_>) -> CliResult<AlertStore> {
    Ok(AlertStore::new(ctx.open_database()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::StatusMatch;

    #[test]
    fn test_single_status_matches_current() {
        let args = AlertFilterArgs {
            statuses: vec![AlertStatus::Active],
            ..AlertFilterArgs::default()
        };
        let filter = args.to_filter().unwrap();
        assert_eq!(
            filter.status,
            Some(StatusMatch::Current(vec![AlertStatus::Active]))
        );
    }

    #[test]
    fn test_ever_spans_history() {
        let args = AlertFilterArgs {
            statuses: vec![AlertStatus::Active, AlertStatus::Silenced],
            ever: true,
            ..AlertFilterArgs::default()
        };
        let filter = args.to_filter().unwrap();
        assert_eq!(
            filter.status,
            Some(StatusMatch::Any(vec![AlertStatus::Active, AlertStatus::Silenced]))
        );
        assert!(!filter.latest_only);
    }

    #[test]
    fn test_several_current_statuses() {
        let args = AlertFilterArgs {
            statuses: vec![AlertStatus::Active, AlertStatus::Silenced],
            ..AlertFilterArgs::default()
        };
        let filter = args.to_filter().unwrap();
        assert!(filter.latest_only);
    }

    #[test]
    fn test_rule_id_must_be_numeric() {
        let args = AlertFilterArgs {
            rule: Some("abc".into()),
            ..AlertFilterArgs::default()
        };
        assert!(matches!(args.to_filter(), Err(CliError::InvalidInput(_))));

        let args = AlertFilterArgs {
            rule: Some("7".into()),
            severities: vec![Severity::Critical],
            ..AlertFilterArgs::default()
        };
        let filter = args.to_filter().unwrap();
        assert_eq!(filter.rule_id, Some(RuleId::new(7)));
        assert_eq!(filter.severities, Some(vec![Severity::Critical]));
    }
}
