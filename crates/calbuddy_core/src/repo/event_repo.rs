//! Event store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist event snapshots keyed by identity.
//! - Append to the change log; expose read paths over both tables.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - No write path clears `retired` or rewrites `first_seen`.
//! - The change log has no update or delete path.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::event::{
    format_event_time, format_record_time, parse_event_time, parse_record_time, ChangeAction,
    ChangeRecord, Event, NewChangeRecord,
};
use crate::model::identity::EventIdentity;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const EVENT_SELECT_SQL: &str = "SELECT
    identity,
    title,
    start_time,
    end_time,
    meeting_link,
    first_seen,
    last_seen,
    retired
FROM events";

const CHANGE_SELECT_SQL: &str = "SELECT
    id,
    ts,
    action,
    identity,
    title,
    start_time,
    end_time,
    meeting_link
FROM changes";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for event and change-log persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// No active event carries this identity.
    NotFound(EventIdentity),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(identity) => write!(f, "active event not found: {identity}"),
            Self::InvalidData(message) => write!(f, "invalid persisted event data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Inclusive calendar-date window; a missing bound leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    /// Window covering exactly one day.
    pub fn on(date: NaiveDate) -> Self {
        Self {
            from: Some(date),
            to: Some(date),
        }
    }

    pub fn between(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }
}

/// Storage collaborator used by the sync engine and query layer.
///
/// All calls issued during one sync run share the caller's transaction.
pub trait EventStore {
    /// Inserts a new event, or refreshes `last_seen` and `meeting_link` of an
    /// existing one. Never touches `retired` or `first_seen`.
    fn upsert_event(&self, event: &Event) -> RepoResult<()>;
    /// Records a repeat observation of an active event.
    fn touch_event(
        &self,
        identity: &EventIdentity,
        seen_at: NaiveDateTime,
        meeting_link: Option<&str>,
    ) -> RepoResult<()>;
    /// Retires an active event.
    fn retire_event(&self, identity: &EventIdentity, retired_at: NaiveDateTime)
        -> RepoResult<()>;
    /// Appends one change record and returns its sequence number.
    fn append_change(&self, record: &NewChangeRecord) -> RepoResult<i64>;
    fn get_event(&self, identity: &EventIdentity) -> RepoResult<Option<Event>>;
    fn list_events(&self, include_retired: bool) -> RepoResult<Vec<Event>>;
    /// Active events whose stored date span overlaps `window`, by start.
    fn events_overlapping(&self, window: &DateWindow) -> RepoResult<Vec<Event>>;
    /// Change records at or after `since`, oldest first.
    fn list_changes(&self, since: Option<NaiveDateTime>) -> RepoResult<Vec<ChangeRecord>>;
    /// Newest change records first.
    fn recent_changes(&self, limit: u32) -> RepoResult<Vec<ChangeRecord>>;

    fn list_active_events(&self) -> RepoResult<Vec<Event>> {
        self.list_events(false)
    }
}

/// SQLite-backed event store.
///
/// Accepts a plain connection or a `Transaction` (via deref).
pub struct SqliteEventStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EventStore for SqliteEventStore<'_> {
    fn upsert_event(&self, event: &Event) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO events (
                identity,
                title,
                start_time,
                end_time,
                meeting_link,
                first_seen,
                last_seen,
                retired
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(identity) DO UPDATE SET
                last_seen = excluded.last_seen,
                meeting_link = excluded.meeting_link;",
            params![
                event.identity.as_str(),
                event.title.as_str(),
                event.start.map(format_event_time),
                event.end.map(format_event_time),
                event.meeting_link.as_deref(),
                format_record_time(event.first_seen),
                format_record_time(event.last_seen),
                bool_to_int(event.retired),
            ],
        )?;
        Ok(())
    }

    fn touch_event(
        &self,
        identity: &EventIdentity,
        seen_at: NaiveDateTime,
        meeting_link: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE events
             SET
                last_seen = ?2,
                meeting_link = ?3
             WHERE identity = ?1
               AND retired = 0;",
            params![identity.as_str(), format_record_time(seen_at), meeting_link],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(identity.clone()));
        }
        Ok(())
    }

    fn retire_event(
        &self,
        identity: &EventIdentity,
        retired_at: NaiveDateTime,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE events
             SET
                retired = 1,
                last_seen = ?2
             WHERE identity = ?1
               AND retired = 0;",
            params![identity.as_str(), format_record_time(retired_at)],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(identity.clone()));
        }
        Ok(())
    }

    fn append_change(&self, record: &NewChangeRecord) -> RepoResult<i64> {
        self.conn.execute(
            "INSERT INTO changes (
                ts,
                action,
                identity,
                title,
                start_time,
                end_time,
                meeting_link
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                format_record_time(record.recorded_at),
                record.action.as_db_str(),
                record.identity.as_str(),
                record.title.as_str(),
                record.start.map(format_event_time),
                record.end.map(format_event_time),
                record.meeting_link.as_deref(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_event(&self, identity: &EventIdentity) -> RepoResult<Option<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EVENT_SELECT_SQL} WHERE identity = ?1;"))?;
        let row = stmt
            .query_row([identity.as_str()], |row| Ok(parse_event_row(row)))
            .optional()?;
        row.transpose()
    }

    fn list_events(&self, include_retired: bool) -> RepoResult<Vec<Event>> {
        let mut sql = format!("{EVENT_SELECT_SQL} WHERE 1 = 1");
        if !include_retired {
            sql.push_str(" AND retired = 0");
        }
        sql.push_str(" ORDER BY first_seen ASC, identity ASC");
        query_events(self.conn, &sql, Vec::new())
    }

    fn events_overlapping(&self, window: &DateWindow) -> RepoResult<Vec<Event>> {
        let mut sql = format!("{EVENT_SELECT_SQL} WHERE retired = 0");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(to) = window.to {
            sql.push_str(" AND date(start_time) <= date(?)");
            bind_values.push(Value::Text(to.to_string()));
        }
        if let Some(from) = window.from {
            sql.push_str(" AND date(end_time) >= date(?)");
            bind_values.push(Value::Text(from.to_string()));
        }

        sql.push_str(" ORDER BY start_time ASC, title ASC, identity ASC");
        query_events(self.conn, &sql, bind_values)
    }

    fn list_changes(&self, since: Option<NaiveDateTime>) -> RepoResult<Vec<ChangeRecord>> {
        let mut sql = format!("{CHANGE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(since) = since {
            sql.push_str(" AND ts >= ?");
            bind_values.push(Value::Text(format_record_time(since)));
        }

        sql.push_str(" ORDER BY ts ASC, id ASC");
        query_changes(self.conn, &sql, bind_values)
    }

    fn recent_changes(&self, limit: u32) -> RepoResult<Vec<ChangeRecord>> {
        let sql = format!("{CHANGE_SELECT_SQL} ORDER BY id DESC LIMIT ?");
        query_changes(self.conn, &sql, vec![Value::Integer(i64::from(limit))])
    }
}

fn query_events(conn: &Connection, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Event>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(parse_event_row(row)?);
    }
    Ok(events)
}

fn query_changes(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<Value>,
) -> RepoResult<Vec<ChangeRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut changes = Vec::new();
    while let Some(row) = rows.next()? {
        changes.push(parse_change_row(row)?);
    }
    Ok(changes)
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<Event> {
    let identity = parse_identity(row.get("identity")?, "events.identity")?;

    let retired = match row.get::<_, i64>("retired")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid retired value `{other}` in events.retired"
            )));
        }
    };

    Ok(Event {
        identity,
        title: row.get("title")?,
        start: parse_optional_event_time(row.get("start_time")?, "events.start_time")?,
        end: parse_optional_event_time(row.get("end_time")?, "events.end_time")?,
        meeting_link: row.get("meeting_link")?,
        first_seen: parse_required_record_time(row.get("first_seen")?, "events.first_seen")?,
        last_seen: parse_required_record_time(row.get("last_seen")?, "events.last_seen")?,
        retired,
    })
}

fn parse_change_row(row: &Row<'_>) -> RepoResult<ChangeRecord> {
    let action_text: String = row.get("action")?;
    let action = ChangeAction::from_db_str(&action_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid action `{action_text}` in changes.action"))
    })?;

    Ok(ChangeRecord {
        sequence: row.get("id")?,
        recorded_at: parse_required_record_time(row.get("ts")?, "changes.ts")?,
        action,
        identity: parse_identity(row.get("identity")?, "changes.identity")?,
        title: row.get("title")?,
        start: parse_optional_event_time(row.get("start_time")?, "changes.start_time")?,
        end: parse_optional_event_time(row.get("end_time")?, "changes.end_time")?,
        meeting_link: row.get("meeting_link")?,
    })
}

fn parse_identity(value: String, column: &str) -> RepoResult<EventIdentity> {
    EventIdentity::from_stored(value.clone())
        .ok_or_else(|| RepoError::InvalidData(format!("invalid identity `{value}` in {column}")))
}

fn parse_optional_event_time(
    value: Option<String>,
    column: &str,
) -> RepoResult<Option<NaiveDateTime>> {
    match value {
        Some(text) => parse_event_time(&text).map(Some).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid event time `{text}` in {column}"))
        }),
        None => Ok(None),
    }
}

fn parse_required_record_time(value: String, column: &str) -> RepoResult<NaiveDateTime> {
    parse_record_time(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
