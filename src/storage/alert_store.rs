//! Alert rule and alert history storage.
//!
//! Every rule owns at least one alert row; the first is an OK placeholder
//! with an empty fingerprint. Alert updates archive the superseded current
//! row and insert the new state, so each `(rule, fingerprint)` keeps a full
//! history with at most one current row.

use super::schema::{
    identity_columns, opt_ts_column, to_micros, truncate_micros, ts_column, validate_identity,
};
use super::{purge_cutoff, Database};
use crate::error::{InvariantViolation, StoreError, StoreResult, ValidationError};
use crate::query::{AlertFilter, Filter, Predicate};
use crate::types::{Alert, AlertId, AlertRule, AlertStatus, ResourceIdentity, RuleId, RuleKey};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

const RULE_COLUMNS: &str = "r.id, r.res_group, r.res_version, r.res_kind, r.res_namespace, \
     r.res_name, r.team, r.name, r.severity, r.source, r.summary";

const ALERT_COLUMNS: &str =
    "a.id, a.rule_id, a.fingerprint, a.status, a.summary, a.labels, a.created_at, a.archived_at";

/// What an alert update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    /// The current alert already had this state.
    Unchanged { rule_id: RuleId, alert: AlertId },
    /// A new current alert was inserted, archiving `archived`.
    Inserted {
        rule_id: RuleId,
        alert: AlertId,
        archived: Vec<AlertId>,
    },
}

impl AlertOutcome {
    pub fn rule_id(&self) -> RuleId {
        match self {
            Self::Unchanged { rule_id, .. } | Self::Inserted { rule_id, .. } => *rule_id,
        }
    }

    /// The current alert after the update.
    pub fn alert_id(&self) -> AlertId {
        match self {
            Self::Unchanged { alert, .. } | Self::Inserted { alert, .. } => *alert,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// Alert store over a shared database.
#[derive(Clone)]
pub struct AlertStore {
    db: Arc<Database>,
    deadline: Option<Instant>,
}

impl AlertStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db, deadline: None }
    }

    /// A handle whose writes roll back if not committed by `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Create a rule together with its placeholder alert.
    ///
    /// Alerts embedded in `rule` are ignored. Fails with
    /// [`ValidationError::DuplicateRule`] if the key is taken.
    pub fn create_rule(&self, rule: &AlertRule) -> StoreResult<AlertRule> {
        validate_rule(rule)?;
        let seeded_at = Utc::now();

        let (rule_id, created) = self.db.write("create_rule", self.deadline, |tx| {
            if find_rule_id(tx, &rule.key())?.is_some() {
                return Err(duplicate_rule(rule));
            }
            insert_rule(tx, rule, seeded_at)
        })?;

        info!(rule_id = %rule_id, name = %rule.name, resource = %rule.resource, "alert rule created");
        Ok(created)
    }

    /// Return the rule with `rule`'s key, creating it if needed.
    pub fn ensure_rule(&self, rule: &AlertRule) -> StoreResult<AlertRule> {
        validate_rule(rule)?;
        let seeded_at = Utc::now();

        self.db.write("ensure_rule", self.deadline, |tx| {
            match find_rule_id(tx, &rule.key())? {
                Some(id) => load_rule(tx, id),
                None => insert_rule(tx, rule, seeded_at).map(|(_, created)| created),
            }
        })
    }

    /// Fetch a rule with its current alerts.
    pub fn get_rule(&self, id: RuleId) -> StoreResult<AlertRule> {
        self.db.read(|conn| {
            let mut rule = load_rule(conn, id)?;
            rule.alerts = select_alerts(conn, &AlertFilter::new().with_rule_id(id).with_latest_only())?;
            Ok(rule)
        })
    }

    /// Look a rule up by its natural key, without alerts.
    pub fn find_rule(&self, key: &RuleKey) -> StoreResult<Option<AlertRule>> {
        self.db.read(|conn| match find_rule_id(conn, key)? {
            Some(id) => load_rule(conn, id).map(Some),
            None => Ok(None),
        })
    }

    /// Rules having at least one alert matching `filter`, each carrying
    /// the matching alerts newest first.
    pub fn list_rules(&self, filter: &AlertFilter) -> StoreResult<Vec<AlertRule>> {
        self.db.read(|conn| {
            let mut grouped: BTreeMap<RuleId, Vec<Alert>> = BTreeMap::new();
            for alert in select_alerts(conn, filter)? {
                if let Some(rule_id) = alert.rule_id {
                    grouped.entry(rule_id).or_default().push(alert);
                }
            }
            if grouped.is_empty() {
                return Ok(Vec::new());
            }

            let mut pred = Predicate::new();
            pred.any_of("r.id", grouped.keys().map(|id| id.get()));
            let sql = format!(
                "SELECT {RULE_COLUMNS} FROM alert_rules r{} ORDER BY r.id",
                pred.where_clause()
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rules = stmt
                .query_map(params_from_iter(pred.params()), rule_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            for rule in &mut rules {
                if let Some(alerts) = rule.id.and_then(|id| grouped.remove(&id)) {
                    rule.alerts = alerts;
                }
            }
            Ok(rules)
        })
    }

    /// Record a new observation of `alert.rule_id`.
    pub fn update_alert(&self, alert: &Alert) -> StoreResult<AlertOutcome> {
        let rule_id = alert.rule_id.ok_or(ValidationError::MissingRuleReference)?;

        let outcome = self.db.write("update_alert", self.deadline, |tx| {
            let rule = load_rule(tx, rule_id)?;
            update_in(tx, &rule, rule_id, alert)
        })?;

        log_outcome(&outcome, alert);
        Ok(outcome)
    }

    /// Apply the single alert embedded in `rule`.
    ///
    /// The rule is resolved by id when set, else by key, creating it (with its
    /// placeholder) when absent. Everything happens in one transaction.
    pub fn update_rule_status(&self, rule: &AlertRule) -> StoreResult<AlertOutcome> {
        let [alert] = rule.alerts.as_slice() else {
            return Err(ValidationError::InvalidRuleAlertCount(rule.alerts.len()).into());
        };
        if rule.id.is_none() {
            validate_rule(rule)?;
        }

        let outcome = self.db.write("update_rule_status", self.deadline, |tx| {
            let (rule_id, stored) = match rule.id {
                Some(id) => (id, load_rule(tx, id)?),
                None => match find_rule_id(tx, &rule.key())? {
                    Some(id) => (id, load_rule(tx, id)?),
                    None => {
                        debug!(name = %rule.name, resource = %rule.resource, "creating rule from status update");
                        insert_rule(tx, rule, alert.created_at)?
                    }
                },
            };
            update_in(tx, &stored, rule_id, alert)
        })?;

        log_outcome(&outcome, alert);
        Ok(outcome)
    }

    pub fn get_alert(&self, id: AlertId) -> StoreResult<Alert> {
        self.db.read(|conn| {
            conn.query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts a WHERE a.id = ?1"),
                params![id],
                alert_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                kind: AlertId::KIND,
                id: id.get(),
            })
        })
    }

    /// Alerts matching `filter`, grouped by rule, most recently recorded first.
    pub fn list_alerts(&self, filter: &AlertFilter) -> StoreResult<Vec<Alert>> {
        self.db.read(|conn| select_alerts(conn, filter))
    }

    /// Delete archived alerts older than `retention` matching `filter`.
    ///
    /// Current alerts are never deleted, so every rule keeps at least one row.
    pub fn purge_history(&self, retention: chrono::Duration, filter: &AlertFilter) -> StoreResult<usize> {
        let cutoff = purge_cutoff(retention, filter.is_selective())?;

        let mut pred = filter.predicate();
        pred.is_not_null("a.archived_at")
            .less_than("a.archived_at", to_micros(cutoff));
        let sql = format!(
            "DELETE FROM alerts WHERE id IN (
                 SELECT a.id FROM alerts a JOIN alert_rules r ON r.id = a.rule_id{}
             )",
            pred.where_clause()
        );

        let purged = self.db.write("purge_alert_history", self.deadline, |tx| {
            Ok(tx.execute(&sql, params_from_iter(pred.params()))?)
        })?;

        info!(purged, cutoff = %cutoff, "purged alert history");
        Ok(purged)
    }
}

fn update_in(
    conn: &Connection,
    rule: &AlertRule,
    rule_id: RuleId,
    alert: &Alert,
) -> StoreResult<AlertOutcome> {
    let history = select_alerts(conn, &AlertFilter::new().with_rule_id(rule_id))?;

    let only_placeholder = match history.as_slice() {
        [] => {
            error!(
                rule_id = %rule_id,
                name = %rule.name,
                group = %rule.resource.group,
                version = %rule.resource.version,
                kind = %rule.resource.kind,
                namespace = %rule.resource.namespace,
                resource_name = %rule.resource.name,
                "alert rule has no alerts"
            );
            return Err(InvariantViolation::RuleWithoutAlerts { rule_id }.into());
        }
        [only] if only.is_current() && only.is_placeholder() => only.id,
        _ => None,
    };

    if let Some(placeholder) = only_placeholder {
        if alert.status == AlertStatus::Ok {
            debug!(rule_id = %rule_id, "rule still OK, placeholder kept");
            return Ok(AlertOutcome::Unchanged {
                rule_id,
                alert: placeholder,
            });
        }
        debug!(rule_id = %rule_id, fingerprint = %alert.fingerprint, "first instance replaces placeholder");
        let archived = archive_current(conn, rule_id, None, alert.created_at)?;
        return Ok(AlertOutcome::Inserted {
            rule_id,
            alert: insert_alert(conn, rule_id, alert)?,
            archived,
        });
    }

    let current = select_alerts(
        conn,
        &AlertFilter::new()
            .with_rule_id(rule_id)
            .with_fingerprint(alert.fingerprint.clone())
            .with_latest_only(),
    )?;
    let current: Vec<(AlertId, AlertStatus)> = current
        .into_iter()
        .filter_map(|a| a.id.map(|id| (id, a.status)))
        .collect();

    match current.as_slice() {
        [] => {
            debug!(rule_id = %rule_id, fingerprint = %alert.fingerprint, "new alert instance");
            let archived = archive_current(conn, rule_id, Some(AlertStatus::Ok), alert.created_at)?;
            Ok(AlertOutcome::Inserted {
                rule_id,
                alert: insert_alert(conn, rule_id, alert)?,
                archived,
            })
        }
        [(id, status)] if *status == alert.status => {
            debug!(rule_id = %rule_id, alert_id = %id, "alert status unchanged");
            Ok(AlertOutcome::Unchanged { rule_id, alert: *id })
        }
        [(id, status)] => {
            debug!(rule_id = %rule_id, alert_id = %id, from = %status, to = %alert.status, "alert status changed");
            archive_alert(conn, *id, alert.created_at)?;
            Ok(AlertOutcome::Inserted {
                rule_id,
                alert: insert_alert(conn, rule_id, alert)?,
                archived: vec![*id],
            })
        }
        many => {
            let alerts: Vec<AlertId> = many.iter().map(|(id, _)| *id).collect();
            error!(
                rule_id = %rule_id,
                fingerprint = %alert.fingerprint,
                alerts = ?alerts,
                group = %rule.resource.group,
                version = %rule.resource.version,
                kind = %rule.resource.kind,
                namespace = %rule.resource.namespace,
                resource_name = %rule.resource.name,
                "multiple current alerts for one fingerprint"
            );
            Err(InvariantViolation::DuplicateCurrentAlerts {
                rule_id,
                fingerprint: alert.fingerprint.clone(),
                alerts,
            }
            .into())
        }
    }
}

fn log_outcome(outcome: &AlertOutcome, alert: &Alert) {
    match outcome {
        AlertOutcome::Unchanged { rule_id, alert: id } => {
            debug!(rule_id = %rule_id, alert_id = %id, "alert unchanged")
        }
        AlertOutcome::Inserted {
            rule_id,
            alert: id,
            archived,
        } => info!(
            rule_id = %rule_id,
            alert_id = %id,
            fingerprint = %alert.fingerprint,
            status = %alert.status,
            archived = archived.len(),
            "alert recorded"
        ),
    }
}

fn validate_rule(rule: &AlertRule) -> StoreResult<()> {
    validate_identity(&rule.resource)?;
    for (field, value) in [("rule name", &rule.name), ("source", &rule.source)] {
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

fn duplicate_rule(rule: &AlertRule) -> StoreError {
    ValidationError::DuplicateRule {
        name: rule.name.clone(),
        identity: rule.resource.to_string(),
        rule_source: rule.source.clone(),
    }
    .into()
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRule> {
    Ok(AlertRule {
        id: Some(row.get(0)?),
        resource: identity_columns(row, 1)?,
        team: row.get(6)?,
        name: row.get(7)?,
        severity: row.get(8)?,
        source: row.get(9)?,
        summary: row.get(10)?,
        alerts: Vec::new(),
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let labels: String = row.get(5)?;
    let labels = serde_json::from_str(&labels)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Alert {
        id: Some(row.get(0)?),
        rule_id: Some(row.get(1)?),
        fingerprint: row.get(2)?,
        status: row.get(3)?,
        summary: row.get(4)?,
        labels,
        created_at: ts_column(row, 6)?,
        archived_at: opt_ts_column(row, 7)?,
    })
}

fn load_rule(conn: &Connection, id: RuleId) -> StoreResult<AlertRule> {
    conn.query_row(
        &format!("SELECT {RULE_COLUMNS} FROM alert_rules r WHERE r.id = ?1"),
        params![id],
        rule_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        kind: RuleId::KIND,
        id: id.get(),
    })
}

fn find_rule_id(conn: &Connection, key: &RuleKey) -> StoreResult<Option<RuleId>> {
    let r: &ResourceIdentity = &key.resource;
    Ok(conn
        .query_row(
            "SELECT id FROM alert_rules
             WHERE name = ?1 AND res_group = ?2 AND res_version = ?3 AND res_kind = ?4
               AND res_namespace = ?5 AND res_name = ?6 AND source = ?7",
            params![key.name, r.group, r.version, r.kind, r.namespace, r.name, key.source],
            |row| row.get(0),
        )
        .optional()?)
}

/// Insert `rule` and its placeholder, returning the stored rule.
fn insert_rule(
    conn: &Connection,
    rule: &AlertRule,
    seeded_at: DateTime<Utc>,
) -> StoreResult<(RuleId, AlertRule)> {
    let r = &rule.resource;
    conn.execute(
        "INSERT INTO alert_rules (res_group, res_version, res_kind, res_namespace, res_name,
                                  team, name, severity, source, summary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            r.group,
            r.version,
            r.kind,
            r.namespace,
            r.name,
            rule.team,
            rule.name,
            rule.severity,
            rule.source,
            rule.summary,
        ],
    )?;
    let rule_id = RuleId::new(conn.last_insert_rowid());

    let seeded_at = truncate_micros(seeded_at);
    let mut placeholder = Alert::placeholder(rule_id, rule.summary.clone(), seeded_at);
    placeholder.id = Some(insert_alert(conn, rule_id, &placeholder)?);

    let stored = AlertRule {
        id: Some(rule_id),
        alerts: vec![placeholder],
        ..rule.clone()
    };
    Ok((rule_id, stored))
}

fn insert_alert(conn: &Connection, rule_id: RuleId, alert: &Alert) -> StoreResult<AlertId> {
    let labels = serde_json::to_string(&alert.labels)?;
    conn.execute(
        "INSERT INTO alerts (rule_id, fingerprint, status, summary, labels, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            rule_id,
            alert.fingerprint,
            alert.status,
            alert.summary,
            labels,
            to_micros(alert.created_at),
        ],
    )?;
    Ok(AlertId::new(conn.last_insert_rowid()))
}

fn archive_alert(conn: &Connection, id: AlertId, at: DateTime<Utc>) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE alerts SET archived_at = ?1 WHERE id = ?2 AND archived_at IS NULL",
        params![to_micros(at), id],
    )?;
    if updated == 0 {
        return Err(StoreError::Conflict(format!("alert {id} was archived")));
    }
    Ok(())
}

/// Archive the rule's current alerts, optionally only those in `status`.
fn archive_current(
    conn: &Connection,
    rule_id: RuleId,
    status: Option<AlertStatus>,
    at: DateTime<Utc>,
) -> StoreResult<Vec<AlertId>> {
    let mut filter = AlertFilter::new().with_rule_id(rule_id).with_latest_only();
    if let Some(status) = status {
        filter = filter.with_status(status);
    }

    let ids: Vec<AlertId> = select_alerts(conn, &filter)?
        .into_iter()
        .filter_map(|a| a.id)
        .collect();
    for id in &ids {
        archive_alert(conn, *id, at)?;
    }
    Ok(ids)
}

fn select_alerts(conn: &Connection, filter: &AlertFilter) -> StoreResult<Vec<Alert>> {
    let pred = filter.predicate();
    let limit = filter
        .history_limit()
        .map_or(i64::MAX, |n| i64::try_from(n).unwrap_or(i64::MAX));

    let sql = format!(
        "SELECT * FROM (
             SELECT {ALERT_COLUMNS}, ROW_NUMBER() OVER (
                 PARTITION BY a.rule_id ORDER BY a.id DESC
             ) AS rn
             FROM alerts a JOIN alert_rules r ON r.id = a.rule_id{}
         )
         WHERE rn <= ?
         ORDER BY rule_id, id DESC",
        pred.where_clause()
    );
    let params = pred.into_params([Value::Integer(limit)]);

    let mut stmt = conn.prepare(&sql)?;
    let alerts = stmt
        .query_map(params_from_iter(params.iter()), alert_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::types::Severity;
    use chrono::{Duration, TimeZone};
    use std::thread;

    struct Fixture {
        db: Arc<Database>,
        store: AlertStore,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Fixture {
            store: AlertStore::new(db.clone()),
            db,
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    fn memory_rule() -> AlertRule {
        AlertRule::new(
            ResourceIdentity::new("", "v1", "Pod", "shop", "web-0"),
            "payments",
            "HighMemory",
            Severity::Critical,
            "prometheus",
        )
        .with_summary("memory above 90%")
    }

    fn created(f: &Fixture) -> RuleId {
        f.store.create_rule(&memory_rule()).unwrap().id.unwrap()
    }

    fn observe(rule_id: RuleId, fingerprint: &str, status: AlertStatus, minute: u32) -> Alert {
        Alert::new(fingerprint, status, at(minute)).for_rule(rule_id)
    }

    fn current(f: &Fixture, rule_id: RuleId) -> Vec<Alert> {
        f.store
            .list_alerts(&AlertFilter::new().with_rule_id(rule_id).with_latest_only())
            .unwrap()
    }

    fn row_count(f: &Fixture) -> i64 {
        f.db.read(|c| Ok(c.query_row("SELECT COUNT(*) FROM alerts", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_create_rule_seeds_placeholder() {
        let f = fixture();
        let rule = f.store.create_rule(&memory_rule()).unwrap();

        assert_eq!(rule.alerts.len(), 1);
        assert!(rule.alerts[0].is_placeholder());
        assert_eq!(rule.alerts[0].summary, "memory above 90%");

        let stored = f.store.get_rule(rule.id.unwrap()).unwrap();
        assert_eq!(stored.alerts, rule.alerts);
        assert_eq!(stored.alerts[0].created_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_rule_created_from_status_keeps_stored_timestamp() {
        let f = fixture();
        let observed = at(3) + Duration::nanoseconds(123_456_789);
        let rule = memory_rule().with_alert(Alert::new("pod-a", AlertStatus::Active, observed));

        let outcome = f.store.update_rule_status(&rule).unwrap();
        let placeholder = f
            .store
            .list_alerts(&AlertFilter::new().with_rule_id(outcome.rule_id()))
            .unwrap()
            .into_iter()
            .find(Alert::is_placeholder)
            .unwrap();
        assert_eq!(placeholder.created_at, truncate_micros(observed));
        assert_eq!(
            f.store.get_alert(outcome.alert_id()).unwrap().created_at,
            truncate_micros(observed)
        );
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let f = fixture();
        created(&f);
        let err = f.store.create_rule(&memory_rule()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn test_ensure_rule_is_idempotent() {
        let f = fixture();
        let first = f.store.ensure_rule(&memory_rule()).unwrap();
        let second = f.store.ensure_rule(&memory_rule()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(row_count(&f), 1);

        let found = f.store.find_rule(&memory_rule().key()).unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[test]
    fn test_ok_on_placeholder_is_noop() {
        let f = fixture();
        let rule_id = created(&f);
        let placeholder = current(&f, rule_id)[0].id.unwrap();

        let outcome = f
            .store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Ok, 1))
            .unwrap();

        assert_eq!(outcome, AlertOutcome::Unchanged { rule_id, alert: placeholder });
        assert_eq!(row_count(&f), 1);
    }

    #[test]
    fn test_first_instance_supersedes_placeholder() {
        let f = fixture();
        let rule_id = created(&f);
        let placeholder = current(&f, rule_id)[0].id.unwrap();

        let outcome = f
            .store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Active, 1))
            .unwrap();

        let AlertOutcome::Inserted { alert, archived, .. } = outcome else {
            panic!("expected insert");
        };
        assert_eq!(archived, vec![placeholder]);
        let now = current(&f, rule_id);
        assert_eq!(now.len(), 1);
        assert_eq!(now[0].id, Some(alert));
        assert_eq!(now[0].fingerprint, "pod-a");
        assert_eq!(f.store.get_alert(placeholder).unwrap().archived_at, Some(at(1)));
    }

    #[test]
    fn test_instance_lifecycle() {
        let f = fixture();
        let rule_id = created(&f);
        let update = |fp: &str, status, minute| {
            f.store.update_alert(&observe(rule_id, fp, status, minute)).unwrap()
        };

        update("pod-a", AlertStatus::Active, 1);
        assert!(!update("pod-a", AlertStatus::Active, 2).is_change());

        update("pod-b", AlertStatus::Active, 3);
        assert_eq!(current(&f, rule_id).len(), 2);

        let resolved = update("pod-a", AlertStatus::Ok, 4);
        assert!(resolved.is_change());
        let statuses: Vec<_> = current(&f, rule_id)
            .iter()
            .map(|a| (a.fingerprint.clone(), a.status))
            .collect();
        assert!(statuses.contains(&("pod-a".to_string(), AlertStatus::Ok)));
        assert!(statuses.contains(&("pod-b".to_string(), AlertStatus::Active)));

        // a new instance clears resolved rows
        let outcome = update("pod-c", AlertStatus::Active, 5);
        let AlertOutcome::Inserted { archived, .. } = outcome else {
            panic!("expected insert");
        };
        assert_eq!(archived, vec![resolved.alert_id()]);
        assert_eq!(current(&f, rule_id).len(), 2);
    }

    #[test]
    fn test_single_real_row_is_not_a_placeholder() {
        let f = fixture();
        let rule_id = created(&f);
        f.store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Active, 1))
            .unwrap();
        f.db.read(|c| {
            c.execute("DELETE FROM alerts WHERE archived_at IS NOT NULL", [])?;
            Ok(())
        })
        .unwrap();

        let outcome = f
            .store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Ok, 2))
            .unwrap();
        assert!(outcome.is_change());
        assert_eq!(current(&f, rule_id)[0].status, AlertStatus::Ok);
    }

    #[test]
    fn test_missing_rule_reference() {
        let f = fixture();
        let err = f
            .store
            .update_alert(&Alert::new("x", AlertStatus::Active, at(0)))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::MissingRuleReference)
        ));
    }

    #[test]
    fn test_unknown_rule_is_not_found() {
        let f = fixture();
        let err = f
            .store
            .update_alert(&observe(RuleId::new(99), "x", AlertStatus::Active, 0))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "alert rule", id: 99 }));
    }

    #[test]
    fn test_rule_without_alerts_is_invariant_violation() {
        let f = fixture();
        let rule_id = created(&f);
        f.db.read(|c| {
            c.execute("DELETE FROM alerts", [])?;
            Ok(())
        })
        .unwrap();

        let err = f
            .store
            .update_alert(&observe(rule_id, "x", AlertStatus::Active, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Invariant(InvariantViolation::RuleWithoutAlerts { .. })
        ));
        assert_eq!(row_count(&f), 0);
    }

    #[test]
    fn test_duplicate_current_alerts_abort_without_writes() {
        let f = fixture();
        let rule_id = created(&f);
        f.store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Active, 1))
            .unwrap();
        f.db.read(|c| {
            c.execute_batch("DROP INDEX alerts_current")?;
            c.execute(
                "INSERT INTO alerts (rule_id, fingerprint, status, summary, labels, created_at)
                 VALUES (?1, 'pod-a', 'Active', '', '{}', 0)",
                params![rule_id],
            )?;
            Ok(())
        })
        .unwrap();
        let before = row_count(&f);

        let err = f
            .store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Ok, 2))
            .unwrap_err();

        let StoreError::Invariant(InvariantViolation::DuplicateCurrentAlerts { fingerprint, alerts, .. }) = err
        else {
            panic!("expected duplicate current alerts, got {err:?}");
        };
        assert_eq!(fingerprint, "pod-a");
        assert_eq!(alerts.len(), 2);
        assert_eq!(row_count(&f), before);
    }

    #[test]
    fn test_rule_status_requires_one_alert() {
        let f = fixture();
        let err = f.store.update_rule_status(&memory_rule()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::InvalidRuleAlertCount(0))
        ));

        let two = memory_rule()
            .with_alert(Alert::new("a", AlertStatus::Active, at(0)))
            .with_alert(Alert::new("b", AlertStatus::Active, at(0)));
        assert!(f.store.update_rule_status(&two).unwrap_err().is_validation());
    }

    #[test]
    fn test_rule_status_creates_rule() {
        let f = fixture();
        let payload = memory_rule().with_alert(
            Alert::new("pod-a", AlertStatus::Active, at(3)).with_label("pod", "web-0"),
        );

        let outcome = f.store.update_rule_status(&payload).unwrap();
        assert!(outcome.is_change());

        let rule = f.store.find_rule(&payload.key()).unwrap().unwrap();
        assert_eq!(rule.id, Some(outcome.rule_id()));

        let alert = f.store.get_alert(outcome.alert_id()).unwrap();
        assert_eq!(alert.labels["pod"], "web-0");
        assert_eq!(row_count(&f), 2);

        let again = f.store.update_rule_status(&payload).unwrap();
        assert_eq!(again.rule_id(), outcome.rule_id());
        assert!(!again.is_change());
    }

    #[test]
    fn test_rule_status_by_unknown_id() {
        let f = fixture();
        let mut payload = memory_rule().with_alert(Alert::new("a", AlertStatus::Active, at(0)));
        payload.id = Some(RuleId::new(5));
        let err = f.store.update_rule_status(&payload).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(f.store.find_rule(&payload.key()).unwrap().is_none());
    }

    #[test]
    fn test_status_filters() {
        let f = fixture();
        let rule_id = created(&f);
        f.store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Active, 1))
            .unwrap();
        f.store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Silenced, 2))
            .unwrap();

        let active_now = f
            .store
            .list_alerts(&AlertFilter::new().with_status(AlertStatus::Active))
            .unwrap();
        assert!(active_now.is_empty());

        let ever_active = f
            .store
            .list_alerts(&AlertFilter::new().with_any_status([AlertStatus::Active]))
            .unwrap();
        assert_eq!(ever_active.len(), 1);
        assert!(!ever_active[0].is_current());

        let latest_two = f
            .store
            .list_alerts(&AlertFilter::new().with_rule_id(rule_id).with_history_limit(2))
            .unwrap();
        assert_eq!(latest_two.len(), 2);
        assert_eq!(latest_two[0].status, AlertStatus::Silenced);
    }

    #[test]
    fn test_list_rules_groups_alerts() {
        let f = fixture();
        let memory = created(&f);
        let disk = f
            .store
            .create_rule(&AlertRule::new(
                ResourceIdentity::new("", "v1", "Pod", "shop", "web-0"),
                "payments",
                "DiskFull",
                Severity::Warning,
                "prometheus",
            ))
            .unwrap()
            .id
            .unwrap();
        f.store
            .update_alert(&observe(memory, "pod-a", AlertStatus::Active, 1))
            .unwrap();

        let all = f.store.list_rules(&AlertFilter::new()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, Some(memory));
        assert_eq!(all[0].alerts.len(), 2);
        assert_eq!(all[0].alerts[0].fingerprint, "pod-a");

        let critical = f
            .store
            .list_rules(&AlertFilter::new().with_severity(Severity::Critical).with_latest_only())
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].alerts.len(), 1);

        let warning = f
            .store
            .list_rules(&AlertFilter::new().with_severity(Severity::Warning))
            .unwrap();
        assert_eq!(warning[0].id, Some(disk));
    }

    #[test]
    fn test_purge_never_removes_current_alerts() {
        let f = fixture();
        let rule_id = created(&f);
        f.store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Active, 1))
            .unwrap();
        f.store
            .update_alert(&observe(rule_id, "pod-a", AlertStatus::Ok, 2))
            .unwrap();
        let filter = AlertFilter::new().with_rule_id(rule_id);

        assert_eq!(f.store.purge_history(Duration::zero(), &filter).unwrap(), 2);
        let remaining = f.store.list_alerts(&filter).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_current());

        let err = f
            .store
            .purge_history(Duration::zero(), &AlertFilter::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(ValidationError::EmptyFilter)));
    }

    #[test]
    fn test_expired_deadline_writes_nothing() {
        let f = fixture();
        let err = f
            .store
            .with_deadline(Instant::now())
            .create_rule(&memory_rule())
            .unwrap_err();
        assert!(matches!(err, StoreError::DeadlineExceeded));
        assert!(f.store.find_rule(&memory_rule().key()).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_updates_keep_one_current_per_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lookout.db");
        let rule_id = {
            let db = Database::open(&path, &StoreSettings::default()).unwrap();
            AlertStore::new(Arc::new(db))
                .create_rule(&memory_rule())
                .unwrap()
                .id
                .unwrap()
        };

        let handles: Vec<_> = (0..4u32)
            .map(|worker| {
                let path = path.clone();
                thread::spawn(move || {
                    let db = Database::open(&path, &StoreSettings::default()).unwrap();
                    let store = AlertStore::new(Arc::new(db));
                    let own = format!("pod-{worker}");
                    for i in 0..10u32 {
                        let status = match (worker + i) % 3 {
                            0 => AlertStatus::Active,
                            1 => AlertStatus::Silenced,
                            _ => AlertStatus::Ok,
                        };
                        let minute = worker * 10 + i;
                        store.update_alert(&observe(rule_id, "pod-shared", status, minute)).unwrap();
                        store.update_alert(&observe(rule_id, &own, status, minute)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let db = Arc::new(Database::open(&path, &StoreSettings::default()).unwrap());
        let current = AlertStore::new(db)
            .list_alerts(&AlertFilter::new().with_rule_id(rule_id).with_latest_only())
            .unwrap();
        let mut per_fingerprint: BTreeMap<&str, usize> = BTreeMap::new();
        for alert in &current {
            *per_fingerprint.entry(alert.fingerprint.as_str()).or_default() += 1;
        }
        assert!(per_fingerprint.values().all(|&n| n == 1), "{per_fingerprint:?}");
        assert_eq!(per_fingerprint.get(""), None);
    }
}
