//! Config subcommand implementation.
//!
//! Handles `lookout config` for inspecting and creating the settings file.

use super::Context;
use crate::config::AppSettings;
use crate::error::{CliError, CliResult};
use crate::output;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;

/// Show or initialize settings.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config actions.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective settings as JSON
    Show,

    /// Print the settings file and database locations
    Path,

    /// Write a settings file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl ConfigCommand {
    /// Execute the config command.
    pub fn execute(&self, ctx: &Context<'_>, explicit: Option<&Path>) -> CliResult<()> {
        let settings_file = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.paths.settings_file());

        match &self.action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(ctx.settings)?);
                Ok(())
            }
            ConfigAction::Path => {
                println!("settings: {}", settings_file.display());
                println!("database: {}", ctx.database_path().display());
                Ok(())
            }
            ConfigAction::Init { force } => {
                if settings_file.exists() && !force {
                    return Err(CliError::InvalidInput(format!(
                        "{} already exists (use --force to overwrite)",
                        settings_file.display()
                    )));
                }
                if let Some(parent) = settings_file.parent() {
                    fs::create_dir_all(parent)?;
                }
                AppSettings::default().save_to(&settings_file)?;
                if !ctx.quiet {
                    output::print_success(&format!("Wrote {}", settings_file.display()));
                }
                Ok(())
            }
        }
    }
}
