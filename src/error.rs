//! Error types for Lookout.
//!
//! Uses `thiserror` for ergonomic error definitions.

use crate::types::{AlertId, RuleId};
use rusqlite::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// The caller supplied an incomplete or invalid payload.
///
/// Validation errors are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("alert has no rule reference")]
    MissingRuleReference,

    #[error("rule payload must carry exactly one alert, found {0}")]
    InvalidRuleAlertCount(usize),

    #[error("refusing to delete with an empty filter set")]
    EmptyFilter,

    #[error("alert rule '{name}' already exists for {identity} (source {rule_source})")]
    DuplicateRule {
        name: String,
        identity: String,
        rule_source: String,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Stored state contradicts a documented guarantee.
///
/// These indicate a bug elsewhere; the operation is aborted and nothing is repaired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("alert rule {rule_id} has no alerts")]
    RuleWithoutAlerts { rule_id: RuleId },

    #[error("alert rule {rule_id} has {} current alerts for fingerprint {fingerprint:?}", alerts.len())]
    DuplicateCurrentAlerts {
        rule_id: RuleId,
        fingerprint: String,
        alerts: Vec<AlertId>,
    },
}

/// Main error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("current record changed concurrently: {0}")]
    Conflict(String),

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("unsupported schema version {found} (expected {expected})")]
    UnsupportedSchema { found: i64, expected: i64 },

    #[error("connection lock poisoned")]
    LockPoisoned,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether re-running the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::ConstraintViolation
            ),
            _ => false,
        }
    }

    /// Whether the caller can fix the request.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a home directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("invalid settings: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn sqlite_failure(code: i32) -> StoreError {
        StoreError::Database(rusqlite::Error::SqliteFailure(ffi::Error::new(code), None))
    }

    #[test]
    fn test_busy_and_conflict_are_retryable() {
        assert!(sqlite_failure(ffi::SQLITE_BUSY).is_retryable());
        assert!(sqlite_failure(ffi::SQLITE_LOCKED).is_retryable());
        assert!(StoreError::Conflict("scan 4".into()).is_retryable());
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let err = StoreError::from(ValidationError::MissingRuleReference);
        assert!(err.is_validation());
        assert!(!err.is_retryable());
        assert!(!StoreError::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn test_invariant_message_carries_context() {
        let err = InvariantViolation::DuplicateCurrentAlerts {
            rule_id: RuleId::new(7),
            fingerprint: "pod-a".into(),
            alerts: vec![AlertId::new(1), AlertId::new(2)],
        };
        let msg = err.to_string();
        assert!(msg.contains("rule 7"));
        assert!(msg.contains("2 current alerts"));
        assert!(msg.contains("pod-a"));
    }

    #[test]
    fn test_duplicate_rule_names_the_key() {
        let err = ValidationError::DuplicateRule {
            name: "HighMemory".into(),
            identity: "v1/Pod shop/web-0".into(),
            rule_source: "prometheus".into(),
        };
        assert_eq!(
            err.to_string(),
            "alert rule 'HighMemory' already exists for v1/Pod shop/web-0 (source prometheus)"
        );
    }
}
