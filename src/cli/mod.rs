//! CLI subcommand definitions and handlers.
//!
//! Implements a git-like subcommand architecture:
//! - `lookout scans ingest|list|show|history|archive|purge` - Security scan results
//! - `lookout alerts ingest|list|rules|show|purge` - Alert rules and alerts
//! - `lookout config show|init` - Settings file management

mod alerts;
mod config;
mod scans;

pub use alerts::AlertsCommand;
pub use config::ConfigCommand;
pub use scans::ScansCommand;

use crate::config::{AppSettings, LogFormat, LogLevel, Paths};
use crate::error::{CliError, CliResult};
use crate::query::IdentityFilter;
use crate::storage::Database;
use crate::types::ResourceIdentity;
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lookout - a versioned store for compliance scans and monitoring alerts.
///
/// Repeated observations of the same resource or alert collapse into one
/// current record; changes archive the previous record so history is kept.
#[derive(Parser, Debug)]
#[command(name = "lookout")]
#[command(author = "HueCodes <huecodes@proton.me>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Versioned storage for scan results and alerts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to custom configuration file
    #[arg(long, global = true, value_name = "PATH", env = "LOOKOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file (overrides the configured path)
    #[arg(long, global = true, value_name = "PATH", env = "LOOKOUT_DATABASE")]
    pub database: Option<PathBuf>,

    /// Output format for results
    #[arg(short = 'o', long = "output", global = true, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store and query security scan results
    #[command(alias = "s")]
    Scans(ScansCommand),

    /// Store and query alert rules and alerts
    #[command(alias = "a")]
    Alerts(AlertsCommand),

    /// Show or initialize settings
    Config(ConfigCommand),
}

impl Cli {
    /// Effective log level: flags override the configured level.
    pub fn log_level(&self, configured: LogLevel) -> LogLevel {
        if self.quiet {
            return LogLevel::Error;
        }
        match self.verbose {
            0 => configured,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Load settings from `--config` or the default location.
    pub fn load_settings(&self, paths: &Paths) -> CliResult<AppSettings> {
        let settings = match &self.config {
            Some(path) => AppSettings::load_from(path)?,
            None => AppSettings::load(paths)?,
        };
        Ok(settings)
    }

    /// Run the selected subcommand.
    pub fn execute(&self, paths: &Paths, settings: &AppSettings) -> CliResult<()> {
        let ctx = Context {
            paths,
            settings,
            database: self.database.clone(),
            format: self.format,
            quiet: self.quiet,
        };
        match &self.command {
            Commands::Scans(cmd) => cmd.execute(&ctx),
            Commands::Alerts(cmd) => cmd.execute(&ctx),
            Commands::Config(cmd) => cmd.execute(&ctx, self.config.as_deref()),
        }
    }
}

/// Shared state handed to subcommands.
pub struct Context<'a> {
    pub paths: &'a Paths,
    pub settings: &'a AppSettings,
    pub database: Option<PathBuf>,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Context<'_> {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.settings.database_path(self.paths))
    }

    /// Open the configured database.
    pub fn open_database(&self) -> CliResult<Arc<Database>> {
        let db = Database::open(&self.database_path(), &self.settings.store)?;
        Ok(Arc::new(db))
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Resource identity selection shared by scan and alert commands.
#[derive(Args, Debug, Clone, Default)]
pub struct IdentityArgs {
    /// API group and version, e.g. "apps/v1" or "v1"
    #[arg(long, value_name = "GROUP/VERSION")]
    pub api_version: Option<String>,

    /// Resource kind, e.g. "Deployment"
    #[arg(long)]
    pub kind: Option<String>,

    /// Resource namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Resource name
    #[arg(long)]
    pub name: Option<String>,
}

impl IdentityArgs {
    /// Filter on whichever fields were given.
    pub fn filter(&self) -> CliResult<IdentityFilter> {
        let (group, version) = match &self.api_version {
            Some(api) => {
                let (group, version) = split_api_version(api)?;
                (Some(group), Some(version))
            }
            None => (None, None),
        };
        Ok(IdentityFilter {
            group,
            version,
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        })
    }

    /// A complete identity; api version, kind and name are required.
    pub fn identity(&self) -> CliResult<ResourceIdentity> {
        let missing = |flag: &str| CliError::InvalidInput(format!("--{flag} is required"));
        let api = self.api_version.as_deref().ok_or_else(|| missing("api-version"))?;
        let kind = self.kind.clone().ok_or_else(|| missing("kind"))?;
        let name = self.name.clone().ok_or_else(|| missing("name"))?;
        let (group, version) = split_api_version(api)?;

        Ok(ResourceIdentity::new(
            group,
            version,
            kind,
            self.namespace.clone().unwrap_or_default(),
            name,
        ))
    }
}

/// Split "group/version" (or a bare core-group "version").
fn split_api_version(api: &str) -> CliResult<(String, String)> {
    let parts: Vec<&str> = api.split('/').collect();
    match parts.as_slice() {
        [version] if !version.is_empty() => Ok((String::new(), version.to_string())),
        [group, version] if !group.is_empty() && !version.is_empty() => {
            Ok((group.to_string(), version.to_string()))
        }
        _ => Err(CliError::InvalidInput(format!("invalid api version: {api:?}"))),
    }
}

/// Read JSON documents from `path` (or stdin for `None` / "-").
///
/// Accepts a single object or an array of objects.
pub fn read_documents<T: DeserializeOwned>(path: Option<&Path>) -> CliResult<Vec<T>> {
    let content = match path {
        Some(p) if p != Path::new("-") => fs::read_to_string(p)?,
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    parse_documents(&content)
}

fn parse_documents<T: DeserializeOwned>(content: &str) -> CliResult<Vec<T>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let docs = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(docs)
}

/// Parse a positive integer id argument.
pub fn parse_id<T>(input: &str) -> CliResult<T>
where
    T: std::str::FromStr<Err = crate::types::IdParseError>,
{
    input
        .parse::<T>()
        .map_err(|e| CliError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScanId, SecurityScanResult};
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(
            split_api_version("apps/v1").unwrap(),
            ("apps".to_string(), "v1".to_string())
        );
        assert_eq!(split_api_version("v1").unwrap(), (String::new(), "v1".to_string()));
        assert!(split_api_version("a/b/c").is_err());
        assert!(split_api_version("/v1").is_err());
    }

    #[test]
    fn test_identity_requires_fields() {
        let args = IdentityArgs {
            api_version: Some("apps/v1".into()),
            kind: Some("Deployment".into()),
            namespace: None,
            name: None,
        };
        assert!(matches!(args.identity(), Err(CliError::InvalidInput(_))));

        let filter = args.filter().unwrap();
        assert_eq!(filter.group.as_deref(), Some("apps"));
        assert_eq!(filter.name, None);
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = Cli::parse_from(["lookout", "-vv", "scans", "list"]);
        assert_eq!(cli.log_level(LogLevel::Warn), LogLevel::Debug);

        let cli = Cli::parse_from(["lookout", "-q", "scans", "list"]);
        assert_eq!(cli.log_level(LogLevel::Info), LogLevel::Error);
    }

    #[test]
    fn test_parse_documents_single_or_array() {
        let one = r#"{"resource": {"version": "v1", "kind": "Pod", "name": "p"},
                      "team": "t", "checkedAt": "2024-03-01T12:00:00Z", "overallStatus": "Success"}"#;
        let docs: Vec<SecurityScanResult> = parse_documents(one).unwrap();
        assert_eq!(docs.len(), 1);

        let many = format!("[{one}, {one}]");
        let docs: Vec<SecurityScanResult> = parse_documents(&many).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id::<ScanId>("12").unwrap(), ScanId::new(12));
        assert!(matches!(parse_id::<ScanId>("-3"), Err(CliError::InvalidInput(_))));
    }
}
