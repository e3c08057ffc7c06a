//! Versioned security scan storage.
//!
//! Each resource identity has at most one current scan. A scan whose content
//! matches the current one only refreshes its `checked_at`; a scan with new
//! content archives the current row at the new scan's time and takes its place.

use super::schema::{identity_columns, opt_ts_column, to_micros, ts_column, validate_identity};
use super::{purge_cutoff, Database, RuleComparison};
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, ScanFilter};
use crate::types::{ResourceIdentity, RuleResult, ScanId, SecurityScanResult};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const SCAN_COLUMNS: &str = "s.id, s.res_group, s.res_version, s.res_kind, s.res_namespace, \
     s.res_name, s.team, s.checked_at, s.archived_at, s.overall_status";

const IDENTITY_PARTITION: &str =
    "s.res_group, s.res_version, s.res_kind, s.res_namespace, s.res_name";

/// What `store_scan` did with a submitted scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// First scan for the resource.
    Created(ScanId),
    /// New content: `archived` was the previous current row.
    Superseded { archived: ScanId, current: ScanId },
    /// Same content: the current row's `checked_at` was bumped.
    Refreshed(ScanId),
    /// Already-archived scan inserted as history.
    Backfilled(ScanId),
}

impl ScanOutcome {
    /// The row written or refreshed.
    pub fn scan_id(&self) -> ScanId {
        match *self {
            Self::Created(id) | Self::Refreshed(id) | Self::Backfilled(id) => id,
            Self::Superseded { current, .. } => current,
        }
    }

    /// Whether a new row was inserted.
    pub fn is_new_row(&self) -> bool {
        !matches!(self, Self::Refreshed(_))
    }
}

/// Scan store over a shared database.
#[derive(Clone)]
pub struct ScanStore {
    db: Arc<Database>,
    comparison: RuleComparison,
    deadline: Option<Instant>,
}

impl ScanStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            comparison: RuleComparison::default(),
            deadline: None,
        }
    }

    /// Set how rule results are paired when comparing scans.
    pub fn with_comparison(mut self, comparison: RuleComparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// A handle whose writes roll back if not committed by `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Persist a scan, versioning it against the resource's current record.
    pub fn store_scan(&self, scan: &SecurityScanResult) -> StoreResult<ScanOutcome> {
        validate_identity(&scan.resource)?;

        let outcome = self
            .db
            .write("store_scan", self.deadline, |tx| self.store_in(tx, scan))?;

        match outcome {
            ScanOutcome::Refreshed(id) => debug!(scan_id = %id, resource = %scan.resource, "scan refreshed"),
            other => info!(scan_id = %other.scan_id(), resource = %scan.resource, outcome = ?other, "scan stored"),
        }
        Ok(outcome)
    }

    fn store_in(&self, conn: &Connection, scan: &SecurityScanResult) -> StoreResult<ScanOutcome> {
        if scan.archived_at.is_some() {
            return Ok(ScanOutcome::Backfilled(insert_scan(conn, scan)?));
        }

        let Some((prior_id, mut prior)) = current_scan(conn, &scan.resource)? else {
            debug!(resource = %scan.resource, "no current scan");
            return Ok(ScanOutcome::Created(insert_scan(conn, scan)?));
        };
        prior.rule_results = load_rule_results(conn, prior_id)?;

        if !self.comparison.is_new_state(&prior, scan) {
            debug!(scan_id = %prior_id, "content unchanged");
            let updated = conn.execute(
                "UPDATE scan_results SET checked_at = ?1 WHERE id = ?2 AND archived_at IS NULL",
                params![to_micros(scan.checked_at), prior_id],
            )?;
            if updated == 0 {
                return Err(StoreError::Conflict(format!("scan {prior_id} was archived")));
            }
            return Ok(ScanOutcome::Refreshed(prior_id));
        }

        debug!(scan_id = %prior_id, "content changed, archiving");
        let archived = conn.execute(
            "UPDATE scan_results SET archived_at = ?1 WHERE id = ?2 AND archived_at IS NULL",
            params![to_micros(scan.checked_at), prior_id],
        )?;
        if archived == 0 {
            return Err(StoreError::Conflict(format!("scan {prior_id} was archived")));
        }

        Ok(ScanOutcome::Superseded {
            archived: prior_id,
            current: insert_scan(conn, scan)?,
        })
    }

    /// Archive every current scan of `identity`. Returns the number archived.
    pub fn archive_resource_scans(&self, identity: &ResourceIdentity) -> StoreResult<usize> {
        validate_identity(identity)?;
        let now = to_micros(Utc::now());

        let archived = self.db.write("archive_resource_scans", self.deadline, |tx| {
            Ok(tx.execute(
                "UPDATE scan_results SET archived_at = ?1
                 WHERE res_group = ?2 AND res_version = ?3 AND res_kind = ?4
                   AND res_namespace = ?5 AND res_name = ?6 AND archived_at IS NULL",
                params![
                    now,
                    identity.group,
                    identity.version,
                    identity.kind,
                    identity.namespace,
                    identity.name
                ],
            )?)
        })?;

        info!(resource = %identity, archived, "archived resource scans");
        Ok(archived)
    }

    /// Fetch one scan with its rule results.
    pub fn get_scan(&self, id: ScanId) -> StoreResult<SecurityScanResult> {
        self.db.read(|conn| {
            let mut scan = conn
                .query_row(
                    &format!("SELECT {SCAN_COLUMNS} FROM scan_results s WHERE s.id = ?1"),
                    params![id],
                    scan_from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound {
                    kind: ScanId::KIND,
                    id: id.get(),
                })?;
            scan.rule_results = load_rule_results(conn, id)?;
            Ok(scan)
        })
    }

    /// List scans without their rule results, newest first per resource.
    pub fn list_scans(&self, latest_only: bool, filter: &ScanFilter) -> StoreResult<Vec<SecurityScanResult>> {
        let mut filter = filter.clone();
        filter.latest_only |= latest_only;
        self.db.read(|conn| select_scans(conn, &filter))
    }

    /// The current scan of `identity` with its rule results, if any.
    pub fn get_latest_resource_scan(
        &self,
        identity: &ResourceIdentity,
    ) -> StoreResult<Option<SecurityScanResult>> {
        self.db.read(|conn| {
            let Some((id, mut scan)) = current_scan(conn, identity)? else {
                return Ok(None);
            };
            scan.rule_results = load_rule_results(conn, id)?;
            Ok(Some(scan))
        })
    }

    /// Every scan of `identity`, newest first, without rule results.
    pub fn list_resource_scan_history(
        &self,
        identity: &ResourceIdentity,
    ) -> StoreResult<Vec<SecurityScanResult>> {
        let filter = ScanFilter::new().with_resource_identity(identity);
        self.db.read(|conn| select_scans(conn, &filter))
    }

    /// Delete archived scans older than `retention` matching `filter`.
    ///
    /// Current scans are never deleted. Rule results go with their scan.
    pub fn purge_history(&self, retention: chrono::Duration, filter: &ScanFilter) -> StoreResult<usize> {
        let cutoff = purge_cutoff(retention, filter.is_selective())?;

        let mut pred = filter.predicate();
        pred.is_not_null("s.archived_at")
            .less_than("s.archived_at", to_micros(cutoff));
        let sql = format!(
            "DELETE FROM scan_results WHERE id IN (SELECT s.id FROM scan_results s{})",
            pred.where_clause()
        );

        let purged = self.db.write("purge_scan_history", self.deadline, |tx| {
            Ok(tx.execute(&sql, params_from_iter(pred.params()))?)
        })?;

        info!(purged, cutoff = %cutoff, "purged scan history");
        Ok(purged)
    }
}

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<SecurityScanResult> {
    Ok(SecurityScanResult {
        id: Some(row.get(0)?),
        resource: identity_columns(row, 1)?,
        team: row.get(6)?,
        checked_at: ts_column(row, 7)?,
        archived_at: opt_ts_column(row, 8)?,
        overall_status: row.get(9)?,
        rule_results: Vec::new(),
    })
}

fn select_scans(conn: &Connection, filter: &ScanFilter) -> StoreResult<Vec<SecurityScanResult>> {
    let pred = filter.predicate();
    let limit = filter
        .history_limit()
        .map_or(i64::MAX, |n| i64::try_from(n).unwrap_or(i64::MAX));

    let sql = format!(
        "SELECT * FROM (
             SELECT {SCAN_COLUMNS}, ROW_NUMBER() OVER (
                 PARTITION BY {IDENTITY_PARTITION} ORDER BY s.checked_at DESC, s.id DESC
             ) AS rn
             FROM scan_results s{}
         )
         WHERE rn <= ?
         ORDER BY res_namespace, res_name, res_kind, res_group, res_version, checked_at DESC, id DESC",
        pred.where_clause()
    );
    let params = pred.into_params([Value::Integer(limit)]);

    let mut stmt = conn.prepare(&sql)?;
    let scans = stmt
        .query_map(params_from_iter(params.iter()), scan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scans)
}

fn current_scan(
    conn: &Connection,
    identity: &ResourceIdentity,
) -> StoreResult<Option<(ScanId, SecurityScanResult)>> {
    let filter = ScanFilter::new()
        .with_resource_identity(identity)
        .with_latest_only();
    Ok(select_scans(conn, &filter)?
        .into_iter()
        .next()
        .and_then(|scan| scan.id.map(|id| (id, scan))))
}

fn load_rule_results(conn: &Connection, scan_id: ScanId) -> StoreResult<Vec<RuleResult>> {
    let mut stmt = conn.prepare_cached(
        "SELECT rule_code, status, message, checked_at FROM rule_results
         WHERE scan_id = ?1 ORDER BY position",
    )?;
    let results = stmt
        .query_map(params![scan_id], |row| {
            Ok(RuleResult {
                rule_code: row.get(0)?,
                status: row.get(1)?,
                message: row.get(2)?,
                checked_at: ts_column(row, 3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(results)
}

fn insert_scan(conn: &Connection, scan: &SecurityScanResult) -> StoreResult<ScanId> {
    let r = &scan.resource;
    conn.execute(
        "INSERT INTO scan_results (res_group, res_version, res_kind, res_namespace, res_name,
                                   team, checked_at, archived_at, overall_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            r.group,
            r.version,
            r.kind,
            r.namespace,
            r.name,
            scan.team,
            to_micros(scan.checked_at),
            scan.archived_at.map(to_micros),
            scan.overall_status,
        ],
    )?;
    let id = ScanId::new(conn.last_insert_rowid());

    let mut stmt = conn.prepare_cached(
        "INSERT INTO rule_results (scan_id, position, rule_code, status, message, checked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (position, rule) in scan.rule_results.iter().enumerate() {
        stmt.execute(params![
            id,
            position as i64,
            rule.rule_code,
            rule.status,
            rule.message,
            to_micros(rule.checked_at),
        ])?;
    }

    Ok(id)
}
