//! Table layout and timestamp encoding.
//!
//! Timestamps are stored as integer microseconds since the Unix epoch so that
//! SQL comparisons order them correctly.

use crate::error::{StoreError, StoreResult, ValidationError};
use crate::types::ResourceIdentity;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

/// Bump when `SCHEMA` changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scan_results (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    res_group      TEXT    NOT NULL,
    res_version    TEXT    NOT NULL,
    res_kind       TEXT    NOT NULL,
    res_namespace  TEXT    NOT NULL,
    res_name       TEXT    NOT NULL,
    team           TEXT    NOT NULL,
    checked_at     INTEGER NOT NULL,
    archived_at    INTEGER,
    overall_status TEXT    NOT NULL
);

-- At most one current scan per resource.
CREATE UNIQUE INDEX IF NOT EXISTS scan_results_current
    ON scan_results (res_group, res_version, res_kind, res_namespace, res_name)
    WHERE archived_at IS NULL;

CREATE INDEX IF NOT EXISTS scan_results_history
    ON scan_results (res_group, res_version, res_kind, res_namespace, res_name, checked_at);

CREATE TABLE IF NOT EXISTS rule_results (
    scan_id    INTEGER NOT NULL REFERENCES scan_results (id) ON DELETE CASCADE,
    position   INTEGER NOT NULL,
    rule_code  TEXT    NOT NULL,
    status     TEXT    NOT NULL,
    message    TEXT    NOT NULL,
    checked_at INTEGER NOT NULL,
    PRIMARY KEY (scan_id, position)
);

CREATE TABLE IF NOT EXISTS alert_rules (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    res_group     TEXT NOT NULL,
    res_version   TEXT NOT NULL,
    res_kind      TEXT NOT NULL,
    res_namespace TEXT NOT NULL,
    res_name      TEXT NOT NULL,
    team          TEXT NOT NULL,
    name          TEXT NOT NULL,
    severity      TEXT NOT NULL,
    source        TEXT NOT NULL,
    summary       TEXT NOT NULL,
    UNIQUE (name, res_group, res_version, res_kind, res_namespace, res_name, source)
);

CREATE TABLE IF NOT EXISTS alerts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_id     INTEGER NOT NULL REFERENCES alert_rules (id) ON DELETE CASCADE,
    fingerprint TEXT    NOT NULL,
    status      TEXT    NOT NULL,
    summary     TEXT    NOT NULL,
    labels      TEXT    NOT NULL,
    created_at  INTEGER NOT NULL,
    archived_at INTEGER
);

-- At most one current alert per rule and fingerprint.
CREATE UNIQUE INDEX IF NOT EXISTS alerts_current
    ON alerts (rule_id, fingerprint)
    WHERE archived_at IS NULL;

CREATE INDEX IF NOT EXISTS alerts_by_rule ON alerts (rule_id, created_at);
";

/// Create tables and record the schema version.
pub fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let tx = conn.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);")?;

    let version: Option<i64> = tx
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => {}
        Some(v) => {
            return Err(StoreError::UnsupportedSchema {
                found: v,
                expected: SCHEMA_VERSION,
            });
        }
        None => {
            tx.execute_batch(SCHEMA)?;
            tx.execute("INSERT INTO schema_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Drop precision below what `to_micros` keeps.
pub fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn from_micros(micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Integer,
            format!("timestamp out of range: {micros}").into(),
        )
    })
}

/// Read a timestamp column.
pub fn ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    from_micros(row.get(idx)?)
}

/// Read a nullable timestamp column.
pub fn opt_ts_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<i64>>(idx)?.map(from_micros).transpose()
}

/// Read the five identity columns starting at `start`.
pub fn identity_columns(row: &rusqlite::Row<'_>, start: usize) -> rusqlite::Result<ResourceIdentity> {
    Ok(ResourceIdentity {
        group: row.get(start)?,
        version: row.get(start + 1)?,
        kind: row.get(start + 2)?,
        namespace: row.get(start + 3)?,
        name: row.get(start + 4)?,
    })
}

/// Reject identities missing a field the store keys on.
pub fn validate_identity(identity: &ResourceIdentity) -> StoreResult<()> {
    let required = [
        ("version", &identity.version),
        ("kind", &identity.kind),
        ("name", &identity.name),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field,
                reason: "must not be empty".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT version FROM schema_meta", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_rejects_unknown_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_meta (version INTEGER NOT NULL);
             INSERT INTO schema_meta (version) VALUES (99);",
        )
        .unwrap();
        assert!(matches!(
            migrate(&mut conn),
            Err(StoreError::UnsupportedSchema { found: 99, .. })
        ));
    }

    #[test]
    fn test_micros_preserve_order_and_value() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert!(to_micros(a) < to_micros(b));
        assert_eq!(from_micros(to_micros(b)).unwrap(), b);
    }

    #[test]
    fn test_truncate_matches_stored_value() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_234_567);
        let truncated = truncate_micros(ts);
        assert_eq!(from_micros(to_micros(ts)).unwrap(), truncated);
        assert_eq!(truncated.timestamp_subsec_nanos(), 1_234_000);
        assert_eq!(truncate_micros(truncated), truncated);
    }
}
