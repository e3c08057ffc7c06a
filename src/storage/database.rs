//! SQLite connection and transaction runner.
//!
//! Every write runs in a `BEGIN IMMEDIATE` transaction: SQLite takes the
//! database write lock before the first read, so the read-compare-write
//! sequences of both stores are serialized against every other writer,
//! including writers in other processes. Retryable failures (busy database,
//! optimistic conflicts) re-run the whole closure after a backoff.

use super::schema;
use crate::config::{JournalMode, RetrySettings, StoreSettings};
use crate::error::{StoreError, StoreResult};
use rand::Rng;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A migrated SQLite database shared by the stores.
pub struct Database {
    conn: Mutex<Connection>,
    retry: RetrySettings,
    busy_timeout: Duration,
    operation_timeout: Option<Duration>,
}

impl Database {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path, settings: &StoreSettings) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            settings.journal_mode.pragma_value(),
            |row| row.get(0),
        )?;
        if settings.journal_mode == JournalMode::Wal && mode != "wal" {
            warn!(path = %path.display(), mode = %mode, "WAL journal mode unavailable");
        }
        Self::from_connection(conn, settings)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open_in_memory_with(&StoreSettings::default())
    }

    pub fn open_in_memory_with(settings: &StoreSettings) -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, settings)
    }

    fn from_connection(mut conn: Connection, settings: &StoreSettings) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(settings.busy_timeout())?;
        schema::migrate(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            retry: settings.retry.clone(),
            busy_timeout: settings.busy_timeout(),
            operation_timeout: settings.operation_timeout(),
        })
    }

    /// Run a read-only query outside any explicit transaction.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    /// Run `f` inside a write transaction, committing only if it succeeds
    /// before `deadline`.
    ///
    /// `f` may run more than once, so it must not have side effects outside
    /// the transaction.
    pub(crate) fn write<T, F>(
        &self,
        operation: &'static str,
        deadline: Option<Instant>,
        mut f: F,
    ) -> StoreResult<T>
    where
        F: FnMut(&Transaction<'_>) -> StoreResult<T>,
    {
        let deadline = self.effective_deadline(deadline);
        let mut attempt = 0;

        loop {
            match self.attempt(deadline, &mut f) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.backoff(attempt);
                    if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                        return Err(StoreError::DeadlineExceeded);
                    }
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying write transaction"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn attempt<T, F>(&self, deadline: Option<Instant>, f: &mut F) -> StoreResult<T>
    where
        F: FnMut(&Transaction<'_>) -> StoreResult<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        let Some(deadline) = deadline else {
            return commit_with(&mut conn, None, f);
        };

        let wait = deadline
            .checked_duration_since(Instant::now())
            .ok_or(StoreError::DeadlineExceeded)?
            .min(self.busy_timeout);
        conn.busy_timeout(wait)?;
        let result = commit_with(&mut conn, Some(deadline), f);
        conn.busy_timeout(self.busy_timeout)?;
        result
    }

    fn effective_deadline(&self, deadline: Option<Instant>) -> Option<Instant> {
        // An unrepresentable timeout imposes no deadline.
        let configured = self
            .operation_timeout
            .and_then(|t| Instant::now().checked_add(t));
        match (deadline, configured) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let jitter = if self.retry.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.retry.jitter_ms)
        } else {
            0
        };
        self.retry.backoff_for(attempt) + Duration::from_millis(jitter)
    }
}

fn commit_with<T, F>(conn: &mut Connection, deadline: Option<Instant>, f: &mut F) -> StoreResult<T>
where
    F: FnMut(&Transaction<'_>) -> StoreResult<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;

    if deadline.is_some_and(|d| Instant::now() >= d) {
        debug!("deadline passed before commit, rolling back");
        return Err(StoreError::DeadlineExceeded);
    }

    tx.commit()?;
    Ok(value)
}
