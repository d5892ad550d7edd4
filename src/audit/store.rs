//! SQLite audit store: WAL-mode database with serialized writes, indexed
//! query, statistics, and retention.
//!
//! Single writer, multiple readers: all writes go through one
//! `Mutex<Connection>`, while every read path opens its own read-only
//! connection, so WAL readers genuinely proceed while a write is in flight.
//! `synchronous = NORMAL` makes inserts durable-on-return without full-fsync
//! cost. Every statement is atomic, so a failed insert never corrupts the
//! store.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use uuid::Uuid;

use crate::audit::event::{
    AuditQuery, Event, EventCategory, EventResult, Severity, Statistics,
};
use crate::core::errors::{CleanerError, Result};

/// Persistent, queryable audit log.
pub struct AuditStore {
    writer: Mutex<Connection>,
    path: PathBuf,
}

impl AuditStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CleanerError::AuditOpen {
                path: parent.to_path_buf(),
                details: source.to_string(),
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| CleanerError::AuditOpen {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            writer: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Open a read-only connection for one query. The writer connection
    /// stays open for the store's lifetime, so the WAL side files exist and
    /// readers never touch the writer lock.
    fn reader(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(audit_query_error)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(audit_query_error)?;
        Ok(conn)
    }

    /// Path to the database file.
    pub fn database_path(&self) -> &Path {
        &self.path
    }

    /// Size of the database file in bytes (0 when missing).
    pub fn database_size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Insert one event. Duplicate ids are rejected.
    pub fn insert(&self, event: &Event) -> Result<()> {
        let metadata_json = serde_json::to_string(&event.metadata)?;
        let conn = self.writer.lock();
        let outcome = conn
            .prepare_cached(
                "INSERT INTO audit_events (
                    id, timestamp, category, action, actor, target,
                    result, severity, metadata_json, session_id, hostname, username
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            )
            .map_err(audit_insert_error)?
            .execute(params![
                event.id.to_string(),
                event.timestamp_sortable(),
                event.category.as_str(),
                event.action,
                event.actor,
                event.target,
                event.result.as_str(),
                event.severity.as_str(),
                metadata_json,
                event.session_id.map(|id| id.to_string()),
                event.hostname,
                event.username,
            ]);

        match outcome {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => Err(CleanerError::DuplicateEvent {
                id: event.id.to_string(),
            }),
            Err(err) => Err(audit_insert_error(err)),
        }
    }

    /// Run a conjunctive filter query, ordered by timestamp.
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<Event>> {
        let (where_clause, values) = build_where(query);
        let order = if query.order_asc { "ASC" } else { "DESC" };
        // rowid breaks millisecond ties in insertion order, which keeps
        // single-session event sequences in program order.
        let mut sql = format!(
            "SELECT id, timestamp, category, action, actor, target, result,
                    severity, metadata_json, session_id, hostname, username
             FROM audit_events {where_clause}
             ORDER BY timestamp {order}, rowid {order}"
        );
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = query.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql).map_err(audit_query_error)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), row_to_event)
            .map_err(audit_query_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(audit_query_error)?;
        rows.into_iter().collect()
    }

    /// Count the events a filter selects.
    pub fn count(&self, query: &AuditQuery) -> Result<u64> {
        let (where_clause, values) = build_where(query);
        let sql = format!("SELECT COUNT(*) FROM audit_events {where_clause}");
        let conn = self.reader()?;
        let count: i64 = conn
            .query_row(&sql, rusqlite::params_from_iter(values.iter()), |row| {
                row.get(0)
            })
            .map_err(audit_query_error)?;
        Ok(u64::try_from(count.max(0)).unwrap_or(0))
    }

    /// Aggregate statistics over the selected set.
    pub fn statistics(&self, query: &AuditQuery) -> Result<Statistics> {
        let (where_clause, values) = build_where(query);
        let conn = self.reader()?;

        let sql = format!(
            "SELECT COUNT(*), MIN(timestamp), MAX(timestamp)
             FROM audit_events {where_clause}"
        );
        let (total, first, last): (i64, Option<String>, Option<String>) = conn
            .query_row(&sql, rusqlite::params_from_iter(values.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(audit_query_error)?;

        let mut by_category = BTreeMap::new();
        let sql = format!(
            "SELECT category, COUNT(*) FROM audit_events {where_clause} GROUP BY category"
        );
        let mut stmt = conn.prepare(&sql).map_err(audit_query_error)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(audit_query_error)?;
        for row in rows {
            let (category, count) = row.map_err(audit_query_error)?;
            by_category.insert(category, u64::try_from(count.max(0)).unwrap_or(0));
        }

        let mut by_result = BTreeMap::new();
        let sql =
            format!("SELECT result, COUNT(*) FROM audit_events {where_clause} GROUP BY result");
        let mut stmt = conn.prepare(&sql).map_err(audit_query_error)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(audit_query_error)?;
        for row in rows {
            let (result, count) = row.map_err(audit_query_error)?;
            by_result.insert(result, u64::try_from(count.max(0)).unwrap_or(0));
        }

        // freed_bytes lives inside the JSON metadata blob; decode in Rust
        // rather than relying on the SQLite JSON extension.
        let mut freed_bytes: u64 = 0;
        let sql = format!("SELECT metadata_json FROM audit_events {where_clause}");
        let mut stmt = conn.prepare(&sql).map_err(audit_query_error)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                row.get::<_, String>(0)
            })
            .map_err(audit_query_error)?;
        for row in rows {
            let raw = row.map_err(audit_query_error)?;
            if let Ok(map) = serde_json::from_str::<BTreeMap<String, String>>(&raw)
                && let Some(value) = map.get("freed_bytes")
                && let Ok(bytes) = value.parse::<u64>()
            {
                freed_bytes = freed_bytes.saturating_add(bytes);
            }
        }

        Ok(Statistics {
            total: u64::try_from(total.max(0)).unwrap_or(0),
            by_category,
            by_result,
            freed_bytes,
            first_timestamp: first.as_deref().and_then(parse_sortable),
            last_timestamp: last.as_deref().and_then(parse_sortable),
        })
    }

    /// Delete events strictly older than `retention_days`; optionally
    /// compact afterwards. Returns the number of rows removed.
    pub fn apply_retention(&self, retention_days: u32, auto_vacuum: bool) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let cutoff_str = cutoff.to_rfc3339_opts(SecondsFormat::Millis, true);
        let conn = self.writer.lock();
        let deleted = conn
            .execute(
                "DELETE FROM audit_events WHERE timestamp < ?1",
                params![cutoff_str],
            )
            .map_err(audit_query_error)?;
        if auto_vacuum {
            conn.execute_batch("VACUUM;").map_err(audit_query_error)?;
        }
        Ok(deleted as u64)
    }

    /// Remove every event. Returns the number of rows removed.
    pub fn clear(&self) -> Result<u64> {
        let conn = self.writer.lock();
        let deleted = conn
            .execute("DELETE FROM audit_events", [])
            .map_err(audit_query_error)?;
        Ok(deleted as u64)
    }

    /// Check that WAL mode is active (diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        let Ok(conn) = self.reader() else {
            return false;
        };
        conn.query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

// ──────────────────── query plumbing ────────────────────

fn build_where(query: &AuditQuery) -> (String, Vec<String>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(from) = query.from {
        clauses.push("timestamp >= ?");
        values.push(from.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    if let Some(until) = query.until {
        clauses.push("timestamp <= ?");
        values.push(until.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    if let Some(category) = query.category {
        clauses.push("category = ?");
        values.push(category.as_str().to_string());
    }
    if let Some(action) = &query.action_contains {
        clauses.push("action LIKE ? ESCAPE '\\'");
        values.push(format!("%{}%", escape_like(action)));
    }
    if let Some(target) = &query.target_contains {
        clauses.push("target LIKE ? ESCAPE '\\'");
        values.push(format!("%{}%", escape_like(target)));
    }
    if let Some(result) = query.result {
        clauses.push("result = ?");
        values.push(result.as_str().to_string());
    }
    if let Some(severity) = query.severity {
        clauses.push("severity = ?");
        values.push(severity.as_str().to_string());
    }
    if let Some(session_id) = query.session_id {
        clauses.push("session_id = ?");
        values.push(session_id.to_string());
    }
    if let Some(actor) = &query.actor {
        clauses.push("actor = ?");
        values.push(actor.clone());
    }

    let mut where_clause = String::new();
    for (index, clause) in clauses.iter().enumerate() {
        if index == 0 {
            where_clause.push_str("WHERE ");
        } else {
            where_clause.push_str(" AND ");
        }
        // Positional params: rewrite the bare ? into ?N.
        where_clause.push_str(&clause.replace('?', &format!("?{}", index + 1)));
    }

    (where_clause, values)
}

/// Substring filters are literal: escape LIKE wildcards (and the escape
/// character itself) so `_` and `%` in a caller's value match only
/// themselves.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Event>> {
    let id: String = row.get(0)?;
    let timestamp: String = row.get(1)?;
    let category: String = row.get(2)?;
    let action: String = row.get(3)?;
    let actor: String = row.get(4)?;
    let target: String = row.get(5)?;
    let result: String = row.get(6)?;
    let severity: String = row.get(7)?;
    let metadata_json: String = row.get(8)?;
    let session_id: Option<String> = row.get(9)?;
    let hostname: String = row.get(10)?;
    let username: String = row.get(11)?;

    Ok(decode_event(
        &id,
        &timestamp,
        &category,
        action,
        actor,
        target,
        &result,
        &severity,
        &metadata_json,
        session_id.as_deref(),
        hostname,
        username,
    ))
}

#[allow(clippy::too_many_arguments)]
fn decode_event(
    id: &str,
    timestamp: &str,
    category: &str,
    action: String,
    actor: String,
    target: String,
    result: &str,
    severity: &str,
    metadata_json: &str,
    session_id: Option<&str>,
    hostname: String,
    username: String,
) -> Result<Event> {
    let corrupt = |field: &str| CleanerError::AuditQuery {
        details: format!("corrupt {field} in stored event {id}"),
    };

    Ok(Event {
        id: Uuid::parse_str(id).map_err(|_| corrupt("id"))?,
        timestamp: parse_sortable(timestamp).ok_or_else(|| corrupt("timestamp"))?,
        category: EventCategory::parse(category).ok_or_else(|| corrupt("category"))?,
        action,
        actor,
        target,
        result: EventResult::parse(result).ok_or_else(|| corrupt("result"))?,
        severity: Severity::parse(severity).ok_or_else(|| corrupt("severity"))?,
        metadata: serde_json::from_str(metadata_json).unwrap_or_default(),
        session_id: match session_id {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| corrupt("session_id"))?),
            None => None,
        },
        hostname,
        username,
    })
}

fn parse_sortable(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn audit_insert_error(err: rusqlite::Error) -> CleanerError {
    CleanerError::AuditInsert {
        details: err.to_string(),
    }
}

fn audit_query_error(err: rusqlite::Error) -> CleanerError {
    CleanerError::AuditQuery {
        details: err.to_string(),
    }
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(|err| CleanerError::AuditOpen {
        path: PathBuf::new(),
        details: err.to_string(),
    })?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_events (
            id TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            category TEXT NOT NULL,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            target TEXT NOT NULL,
            result TEXT NOT NULL,
            severity TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            session_id TEXT,
            hostname TEXT NOT NULL,
            username TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_events(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_category ON audit_events(category);
        CREATE INDEX IF NOT EXISTS idx_audit_session ON audit_events(session_id);
        CREATE INDEX IF NOT EXISTS idx_audit_result ON audit_events(result);",
    )
    .map_err(|err| CleanerError::AuditSchema {
        details: err.to_string(),
    })?;
    Ok(())
}

// ──────────────────── tests ────────────────────
