use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;

/// One stored session, blob included.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub manager_id: String,
    pub session: Vec<u8>,
    pub last_check: String,
    pub authenticated: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing view without the blob.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub manager_id: String,
    pub size: i64,
    pub last_check: String,
    pub authenticated: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields a PATCH may change. `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct RecordFields {
    pub session: Option<Vec<u8>>,
    pub last_check: Option<String>,
    pub authenticated: Option<bool>,
}

/// Fixed-width UTC form so stored timestamps order correctly as text.
pub fn normalize_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    normalize_timestamp(&Utc::now())
}

fn row_to_record(row: &Row) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        manager_id: row.get("manager_id")?,
        session: row.get("session")?,
        last_check: row.get("last_check")?,
        authenticated: row.get("authenticated")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_summary(row: &Row) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        manager_id: row.get("manager_id")?,
        size: row.get("size")?,
        last_check: row.get("last_check")?,
        authenticated: row.get("authenticated")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SUMMARY_COLUMNS: &str =
    "manager_id, length(session) AS size, last_check, authenticated, created_at, updated_at";

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<SessionSummary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM session_records ORDER BY last_check DESC",
        SUMMARY_COLUMNS
    ))?;
    let rows = stmt.query_map([], row_to_summary)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn find_by_id(conn: &Connection, manager_id: &str) -> anyhow::Result<Option<SessionRecord>> {
    let record = conn
        .query_row(
            "SELECT * FROM session_records WHERE manager_id = ?",
            params![manager_id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

pub fn find_summary(conn: &Connection, manager_id: &str) -> anyhow::Result<Option<SessionSummary>> {
    let summary = conn
        .query_row(
            &format!("SELECT {} FROM session_records WHERE manager_id = ?", SUMMARY_COLUMNS),
            params![manager_id],
            row_to_summary,
        )
        .optional()?;
    Ok(summary)
}

fn current_last_check(conn: &Connection, manager_id: &str) -> anyhow::Result<Option<String>> {
    let last_check = conn
        .query_row(
            "SELECT last_check FROM session_records WHERE manager_id = ?",
            params![manager_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(last_check)
}

/// Insert or replace the record. Returns `true` when it did not exist.
///
/// A write whose `last_check` is older than the stored one is ignored, so
/// retried requests cannot roll the record back. The check and the write run
/// in one immediate transaction.
pub fn upsert(
    conn: &mut Connection,
    manager_id: &str,
    session: &[u8],
    last_check: &str,
    authenticated: bool,
) -> anyhow::Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing = current_last_check(&tx, manager_id)?;
    if let Some(current) = &existing {
        if last_check < current.as_str() {
            tracing::debug!(manager_id, "Ignoring stale session write");
            return Ok(false);
        }
    }

    let ts = now();
    tx.execute(
        "INSERT INTO session_records (manager_id, session, last_check, authenticated, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(manager_id) DO UPDATE SET
           session = excluded.session,
           last_check = excluded.last_check,
           authenticated = excluded.authenticated,
           updated_at = excluded.updated_at",
        params![manager_id, session, last_check, authenticated, ts],
    )?;
    tx.commit()?;
    Ok(existing.is_none())
}

/// Apply `fields` to an existing record. Returns `false` when there is none.
pub fn update_fields(conn: &mut Connection, manager_id: &str, fields: &RecordFields) -> anyhow::Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let Some(current) = current_last_check(&tx, manager_id)? else {
        return Ok(false);
    };
    if let Some(last_check) = &fields.last_check {
        if last_check.as_str() < current.as_str() {
            tracing::debug!(manager_id, "Ignoring stale session update");
            return Ok(true);
        }
    }

    let mut sets = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref session) = fields.session {
        sets.push("session = ?");
        values.push(Box::new(session.clone()));
    }
    if let Some(ref last_check) = fields.last_check {
        sets.push("last_check = ?");
        values.push(Box::new(last_check.clone()));
    }
    if let Some(authenticated) = fields.authenticated {
        sets.push("authenticated = ?");
        values.push(Box::new(authenticated));
    }

    sets.push("updated_at = ?");
    values.push(Box::new(now()));
    values.push(Box::new(manager_id.to_string()));

    let sql = format!("UPDATE session_records SET {} WHERE manager_id = ?", sets.join(", "));
    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    tx.execute(&sql, params.as_slice())?;
    tx.commit()?;
    Ok(true)
}

/// Remove every record for `manager_id`. Returns how many were removed.
pub fn delete(conn: &Connection, manager_id: &str) -> anyhow::Result<usize> {
    let changes = conn.execute(
        "DELETE FROM session_records WHERE manager_id = ?",
        params![manager_id],
    )?;
    Ok(changes)
}
