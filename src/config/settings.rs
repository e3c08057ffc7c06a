//! Application settings and paths.
//!
//! Manages XDG-compliant paths for configuration and data, and the settings
//! file that tunes the store, retries and logging.

use crate::error::{ConfigError, ConfigResult};
use crate::storage::RuleComparison;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Application directory paths following XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/lookout)
    pub config_dir: PathBuf,
    /// Data directory (~/.local/share/lookout)
    pub data_dir: PathBuf,
}

impl Paths {
    /// Resolve paths using XDG directories, creating them if missing.
    pub fn resolve() -> ConfigResult<Self> {
        let project =
            ProjectDirs::from("com", "lookout", "lookout").ok_or(ConfigError::DirectoryNotFound)?;

        let paths = Self {
            config_dir: project.config_dir().to_path_buf(),
            data_dir: project.data_dir().to_path_buf(),
        };

        fs::create_dir_all(&paths.config_dir)?;
        fs::create_dir_all(&paths.data_dir)?;

        Ok(paths)
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Get the default database location.
    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("lookout.db")
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Retry policy for retryable write failures (busy database, conflicts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the initial attempt.
    pub max_retries: usize,
    /// Delays between attempts; the last entry repeats.
    pub backoff_ms: Vec<u64>,
    /// Upper bound of random delay added to each backoff.
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: vec![10, 50, 200],
            jitter_ms: 10,
        }
    }
}

impl RetrySettings {
    /// Backoff before retry number `attempt` (zero-based), without jitter.
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        let ms = self
            .backoff_ms
            .get(attempt)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(10);
        Duration::from_millis(ms)
    }
}

/// Store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database file; defaults to the XDG data directory.
    pub path: Option<PathBuf>,
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    /// Deadline applied to every write, in milliseconds.
    pub operation_timeout_ms: Option<u64>,
    pub retry: RetrySettings,
    pub rule_comparison: RuleComparison,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::Wal,
            operation_timeout_ms: None,
            retry: RetrySettings::default(),
            rule_comparison: RuleComparison::default(),
        }
    }
}

impl StoreSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Flattened JSON lines.
    Json,
    /// Human-readable text.
    #[default]
    Text,
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub store: StoreSettings,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    /// Age after which archived scans are purged.
    pub scan_retention_days: u32,
    /// Age after which archived alerts are purged.
    pub alert_retention_days: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            log_level: LogLevel::Warn,
            log_format: LogFormat::Text,
            scan_retention_days: 90,
            alert_retention_days: 30,
        }
    }
}

impl AppSettings {
    /// Load settings from the default location, falling back to defaults.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let file = paths.settings_file();

        if !file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    /// Save settings to `path`.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Database location, resolving the default against `paths`.
    pub fn database_path(&self, paths: &Paths) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.store.busy_timeout_ms, 5_000);
        assert_eq!(settings.store.rule_comparison, RuleComparison::ByRuleCode);
        assert_eq!(settings.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_partial_settings_file() {
        let parsed: AppSettings = serde_json::from_str(
            r#"{"store": {"rule_comparison": "positional", "retry": {"max_retries": 7}},
                "log_format": "json"}"#,
        )
        .unwrap();
        assert_eq!(parsed.store.rule_comparison, RuleComparison::Positional);
        assert_eq!(parsed.store.retry.max_retries, 7);
        assert_eq!(parsed.store.retry.backoff_ms, vec![10, 50, 200]);
        assert_eq!(parsed.log_format, LogFormat::Json);
        assert_eq!(parsed.alert_retention_days, 30);
    }

    #[test]
    fn test_backoff_repeats_last_entry() {
        let retry = RetrySettings {
            max_retries: 5,
            backoff_ms: vec![1, 2],
            jitter_ms: 0,
        };
        assert_eq!(retry.backoff_for(0), Duration::from_millis(1));
        assert_eq!(retry.backoff_for(4), Duration::from_millis(2));
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.json");
        let mut settings = AppSettings::default();
        settings.scan_retention_days = 7;
        settings.save_to(&file).unwrap();

        let loaded = AppSettings::load_from(&file).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
