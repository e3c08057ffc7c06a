//! Scans subcommand implementation.
//!
//! Handles `lookout scans` for ingesting and inspecting security scan results.

use super::{parse_id, read_documents, Context, IdentityArgs};
use crate::error::{CliError, CliResult};
use crate::output;
use crate::query::ScanFilter;
use crate::storage::{RuleComparison, ScanOutcome, ScanStore};
use crate::types::{CheckStatus, ScanId, SecurityScanResult};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Store and query security scan results.
#[derive(Parser, Debug)]
pub struct ScansCommand {
    #[command(subcommand)]
    pub action: ScansAction,
}

/// Scan actions.
#[derive(Subcommand, Debug)]
pub enum ScansAction {
    /// Store scan results from a JSON file or stdin
    Ingest {
        /// File holding one scan object or an array of them ("-" for stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Compare rule results by list position instead of rule code
        #[arg(long)]
        positional: bool,
    },

    /// List stored scans
    #[command(alias = "ls")]
    List {
        /// Only current scans
        #[arg(long)]
        latest: bool,

        #[command(flatten)]
        filter: ScanFilterArgs,
    },

    /// Show one scan with its rule results
    Show {
        /// Scan ID
        id: String,
    },

    /// Show the scan history of one resource, newest first
    History {
        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Mark the current scan of a resource as archived (e.g. after deletion)
    Archive {
        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Delete archived scans older than the retention period
    Purge {
        /// Retention in days (defaults to the configured value)
        #[arg(long, value_name = "DAYS")]
        older_than: Option<u32>,

        #[command(flatten)]
        filter: ScanFilterArgs,
    },
}

/// Scan filter flags.
#[derive(Args, Debug, Clone, Default)]
pub struct ScanFilterArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Owning team
    #[arg(long)]
    pub team: Option<String>,

    /// Overall status (repeatable)
    #[arg(long = "status", value_name = "STATUS")]
    pub statuses: Vec<CheckStatus>,

    /// Maximum scans per resource, newest first
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,
}

impl ScanFilterArgs {
    pub fn to_filter(&self) -> CliResult<ScanFilter> {
        let mut filter = ScanFilter::new().with_resource_identity(self.identity.filter()?);
        if let Some(team) = &self.team {
            filter = filter.with_team(team.clone());
        }
        if !self.statuses.is_empty() {
            filter = filter.with_any_status(self.statuses.iter().copied());
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
    created: usize,
    superseded: usize,
    refreshed: usize,
    backfilled: usize,
    failed: usize,
}

impl IngestSummary {
    fn record(&mut self, outcome: &ScanOutcome) {
        match outcome {
            ScanOutcome::Created(_) => self.created += 1,
            ScanOutcome::Superseded { .. } => self.superseded += 1,
            ScanOutcome::Refreshed(_) => self.refreshed += 1,
            ScanOutcome::Backfilled(_) => self.backfilled += 1,
        }
    }

    fn message(&self) -> String {
        format!(
            "{} created, {} superseded, {} refreshed, {} backfilled",
            self.created, self.superseded, self.refreshed, self.backfilled
        )
    }
}

impl ScansCommand {
    /// Execute the scans command.
    pub fn execute(&self, ctx: &Context<'_>) -> CliResult<()> {
        match &self.action {
            ScansAction::Ingest { file, positional } => {
                self.ingest(ctx, file.as_deref(), *positional)
            }
            ScansAction::List { latest, filter } => {
                let scans = store(ctx, false)?.list_scans(*latest, &filter.to_filter()?)?;
                output::print_scans(&scans, ctx.format)?;
                Ok(())
            }
            ScansAction::Show { id } => {
                let scan = store(ctx, false)?.get_scan(parse_id::<ScanId>(id)?)?;
                output::print_scan(&scan, ctx.format)?;
                Ok(())
            }
            ScansAction::History { identity } => {
                let scans = store(ctx, false)?.list_resource_scan_history(&identity.identity()?)?;
                output::print_scans(&scans, ctx.format)?;
                Ok(())
            }
            ScansAction::Archive { identity } => {
                let identity = identity.identity()?;
                let archived = store(ctx, false)?.archive_resource_scans(&identity)?;
                if !ctx.quiet {
                    output::print_success(&format!("Archived {archived} scan(s) of {identity}"));
                }
                Ok(())
            }
            ScansAction::Purge { older_than, filter } => {
                let days = older_than.unwrap_or(ctx.settings.scan_retention_days);
                let purged = store(ctx, false)?
                    .purge_history(chrono::Duration::days(i64::from(days)), &filter.to_filter()?)?;
                if !ctx.quiet {
                    output::print_success(&format!(
                        "Purged {purged} archived scan(s) older than {days} day(s)"
                    ));
                }
                Ok(())
            }
        }
    }

    fn ingest(&self, ctx: &Context<'_>, file: Option<&std::path::Path>, positional: bool) -> CliResult<()> {
        let scans: Vec<SecurityScanResult> = read_documents(file)?;
        let store = store(ctx, positional)?;

        let mut summary = IngestSummary::default();
        for (index, scan) in scans.iter().enumerate() {
            match store.store_scan(scan) {
                Ok(outcome) => summary.record(&outcome),
                Err(err) => {
                    summary.failed += 1;
                    output::print_error(&format!("document {index} ({}): {err}", scan.resource));
                }
            }
        }

        if summary.failed > 0 {
            return Err(CliError::InvalidInput(format!(
                "{} of {} scan(s) failed; {}",
                summary.failed,
                scans.len(),
                summary.message()
            )));
        }
        if !ctx.quiet {
            output::print_success(&summary.message());
        }
        Ok(())
    }
}

fn store(ctx: &Context<'_>, positional: bool) -> CliResult<ScanStore> {
    let comparison = if positional {
        RuleComparison::Positional
    } else {
        ctx.settings.store.rule_comparison
    };
    Ok(ScanStore::new(ctx.open_database()?).with_comparison(comparison))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScanId;

    #[test]
    fn test_filter_args() {
        let args = ScanFilterArgs {
            identity: IdentityArgs {
                namespace: Some("shop".into()),
                ..IdentityArgs::default()
            },
            team: Some("payments".into()),
            statuses: vec![CheckStatus::Failure, CheckStatus::Error],
            limit: Some(5),
        };
        let filter = args.to_filter().unwrap();
        assert_eq!(filter.identity.namespace.as_deref(), Some("shop"));
        assert_eq!(
            filter.statuses,
            Some(vec![CheckStatus::Failure, CheckStatus::Error])
        );
        assert_eq!(filter.history_limit, Some(5));
    }

    #[test]
    fn test_empty_filter_args_are_unrestricted() {
        assert_eq!(ScanFilterArgs::default().to_filter().unwrap(), ScanFilter::new());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = IngestSummary::default();
        summary.record(&ScanOutcome::Created(ScanId::new(1)));
        summary.record(&ScanOutcome::Refreshed(ScanId::new(1)));
        summary.record(&ScanOutcome::Superseded {
            archived: ScanId::new(1),
            current: ScanId::new(2),
        });
        assert_eq!(
            summary.message(),
            "1 created, 1 superseded, 1 refreshed, 0 backfilled"
        );
    }
}
