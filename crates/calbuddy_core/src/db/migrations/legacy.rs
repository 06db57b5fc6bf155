//! Import of stores written by the first CalendarBuddy release.
//!
//! Those files sit at `user_version = 0` with `events(uid, ..., deleted)` and
//! `changes(uid, ...)`. Their rows are lifted out and the old tables dropped
//! before migration 1 runs; the rows are written back once the current schema
//! exists.
//!
//! # Invariants
//! - Identities are re-derived from title/start/end; stored uids are dropped.
//! - `deleted = 1` becomes `retired = 1`.
//! - Change rows keep their sequence numbers and action tags.

use crate::db::DbResult;
use crate::model::event::{
    format_event_time, format_record_time, parse_event_time, parse_record_time, ChangeAction,
};
use crate::model::identity::EventIdentity;
use chrono::NaiveDateTime;
use log::warn;
use rusqlite::{params, Connection};

const EVENT_COLUMNS: &[&str] = &[
    "title",
    "start_time",
    "end_time",
    "first_seen",
    "last_seen",
    "meeting_link",
    "deleted",
];
const CHANGE_COLUMNS: &[&str] = &[
    "id",
    "ts",
    "action",
    "title",
    "start_time",
    "end_time",
    "meeting_link",
];

#[derive(Debug)]
struct LegacyEvent {
    title: Option<String>,
    start: Option<String>,
    end: Option<String>,
    first_seen: Option<String>,
    last_seen: Option<String>,
    meeting_link: Option<String>,
    deleted: Option<i64>,
}

#[derive(Debug)]
struct LegacyChange {
    id: i64,
    ts: Option<String>,
    action: Option<String>,
    title: Option<String>,
    start: Option<String>,
    end: Option<String>,
    meeting_link: Option<String>,
}

/// Rows held in memory between dropping the legacy tables and recreating them.
#[derive(Debug)]
pub(super) struct LegacyStore {
    events: Vec<LegacyEvent>,
    changes: Vec<LegacyChange>,
}

/// Outcome counters for the `db_legacy_import` log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct LegacyImport {
    pub events: usize,
    pub changes: usize,
    pub skipped: usize,
}

/// Reads and drops the legacy tables when `events` has the `uid` layout.
pub(super) fn lift(conn: &Connection) -> DbResult<Option<LegacyStore>> {
    let event_columns = table_columns(conn, "events")?;
    if !event_columns.iter().any(|column| column == "uid") {
        return Ok(None);
    }
    let change_columns = table_columns(conn, "changes")?;

    let events = {
        let sql = format!(
            "SELECT {} FROM events ORDER BY first_seen;",
            select_list(EVENT_COLUMNS, &event_columns)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(LegacyEvent {
                title: row.get(0)?,
                start: row.get(1)?,
                end: row.get(2)?,
                first_seen: row.get(3)?,
                last_seen: row.get(4)?,
                meeting_link: row.get(5)?,
                deleted: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let changes = if change_columns.is_empty() {
        Vec::new()
    } else {
        let sql = format!(
            "SELECT {} FROM changes ORDER BY id;",
            select_list(CHANGE_COLUMNS, &change_columns)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(LegacyChange {
                id: row.get(0)?,
                ts: row.get(1)?,
                action: row.get(2)?,
                title: row.get(3)?,
                start: row.get(4)?,
                end: row.get(5)?,
                meeting_link: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    conn.execute_batch("DROP TABLE IF EXISTS changes; DROP TABLE events;")?;
    Ok(Some(LegacyStore { events, changes }))
}

/// Writes lifted rows into the current schema. `now` fills missing
/// observation timestamps.
pub(super) fn restore(
    conn: &Connection,
    store: LegacyStore,
    now: NaiveDateTime,
) -> DbResult<LegacyImport> {
    let mut outcome = LegacyImport::default();

    for event in store.events {
        let title = event.title.unwrap_or_default();
        let start = event.start.as_deref().and_then(parse_event_time);
        let end = event.end.as_deref().and_then(parse_event_time);
        let first_seen = event.first_seen.as_deref().and_then(parse_record_time);
        let last_seen = event.last_seen.as_deref().and_then(parse_record_time);
        let first_seen = first_seen.or(last_seen).unwrap_or(now);
        let last_seen = last_seen.unwrap_or(first_seen);

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO events (
                identity, title, start_time, end_time, meeting_link,
                first_seen, last_seen, retired
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                EventIdentity::derive(&title, start, end).as_str(),
                title,
                start.map(format_event_time),
                end.map(format_event_time),
                event.meeting_link,
                format_record_time(first_seen),
                format_record_time(last_seen),
                i64::from(event.deleted.unwrap_or(0) != 0),
            ],
        )?;
        if inserted == 0 {
            outcome.skipped += 1;
        } else {
            outcome.events += 1;
        }
    }

    for change in store.changes {
        let Some(action) = change.action.as_deref().and_then(ChangeAction::from_db_str) else {
            warn!(
                "event=db_legacy_import module=db status=skip sequence={} reason=unknown_action",
                change.id
            );
            outcome.skipped += 1;
            continue;
        };
        let title = change.title.unwrap_or_default();
        let start = change.start.as_deref().and_then(parse_event_time);
        let end = change.end.as_deref().and_then(parse_event_time);
        let recorded_at = change
            .ts
            .as_deref()
            .and_then(parse_record_time)
            .unwrap_or(now);

        conn.execute(
            "INSERT INTO changes (
                id, ts, action, identity, title, start_time, end_time, meeting_link
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                change.id,
                format_record_time(recorded_at),
                action.as_db_str(),
                EventIdentity::derive(&title, start, end).as_str(),
                title,
                start.map(format_event_time),
                end.map(format_event_time),
                change.meeting_link,
            ],
        )?;
        outcome.changes += 1;
    }

    Ok(outcome)
}

fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

// Older files predate some columns; those read as NULL.
fn select_list(wanted: &[&str], present: &[String]) -> String {
    wanted
        .iter()
        .map(|column| {
            if present.iter().any(|name| name == column) {
                (*column).to_string()
            } else {
                format!("NULL AS {column}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::select_list;

    #[test]
    fn missing_columns_select_null() {
        let present = vec!["title".to_string(), "start_time".to_string()];
        assert_eq!(
            select_list(&["title", "start_time", "meeting_link"], &present),
            "title, start_time, NULL AS meeting_link"
        );
    }
}
