// Lookout - versioned storage for compliance scans and monitoring alerts.

use anyhow::{Context, Result};
use clap::Parser;
use lookout::cli::Cli;
use lookout::config::Paths;
use lookout::logging::init_logging;
use lookout::output;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let paths = Paths::resolve().context("failed to resolve config directories")?;
    let settings = cli.load_settings(&paths).context("failed to load settings")?;

    init_logging(
        cli.log_level(settings.log_level),
        cli.log_format.unwrap_or(settings.log_format),
    );
    tracing::debug!(database = %settings.database_path(&paths).display(), "settings loaded");

    cli.execute(&paths, &settings)?;
    Ok(())
}
