//! Read-only projections over stored events and the change log.
//!
//! # Responsibility
//! - Answer "what is on this date / in this range" over active events.
//! - Answer "what changed since" over the audit log.
//! - Parse user-facing date and `since` arguments.
//!
//! # Invariants
//! - Never mutates storage.
//! - Event rows are ordered by start; change rows by timestamp then sequence.

use crate::model::event::{format_event_time, ChangeRecord, Event};
use crate::repo::event_repo::{DateWindow, EventStore, RepoError, RepoResult};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

static SINCE_HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)\s*h$").expect("valid since hours regex"));

const SINCE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Query-layer error.
#[derive(Debug)]
pub enum QueryError {
    /// `since` is neither `<N>h` nor an ISO date/datetime.
    InvalidSince(String),
    /// Date argument is not `YYYY-MM-DD`.
    InvalidDate(String),
    /// `from` falls after `to`.
    InvalidWindow { from: NaiveDate, to: NaiveDate },
    Repo(RepoError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSince(value) => write!(
                f,
                "invalid since value `{value}`; provide an ISO datetime or e.g. 48h"
            ),
            Self::InvalidDate(value) => write!(f, "invalid date `{value}`; expected YYYY-MM-DD"),
            Self::InvalidWindow { from, to } => {
                write!(f, "range start {from} is after range end {to}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for QueryError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Listing row for event views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRow {
    pub title: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub meeting_link: Option<String>,
}

impl From<Event> for EventRow {
    fn from(event: Event) -> Self {
        Self {
            title: event.title,
            start_time: event.start.map(format_event_time),
            end_time: event.end.map(format_event_time),
            meeting_link: event.meeting_link,
        }
    }
}

/// Read-only query facade over an event store.
pub struct QueryService<R: EventStore> {
    repo: R,
}

impl<R: EventStore> QueryService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Active events whose stored date span contains `date`, by start.
    pub fn events_on_date(&self, date: NaiveDate) -> RepoResult<Vec<EventRow>> {
        let events = self.repo.events_overlapping(&DateWindow::on(date))?;
        info!(
            "event=query module=query kind=events_on_date status=ok rows={}",
            events.len()
        );
        Ok(events.into_iter().map(EventRow::from).collect())
    }

    /// Active events overlapping `[from, to]`; a missing bound is open.
    ///
    /// # Errors
    /// - `InvalidWindow` when both bounds are set and `from > to`.
    pub fn events_in_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<EventRow>, QueryError> {
        let window = DateWindow::between(from, to);
        if let (true, Some(from), Some(to)) = (window.is_inverted(), from, to) {
            return Err(QueryError::InvalidWindow { from, to });
        }

        let events = self.repo.events_overlapping(&window)?;
        info!(
            "event=query module=query kind=events_in_range status=ok rows={} open_from={} open_to={}",
            events.len(),
            from.is_none(),
            to.is_none()
        );
        Ok(events.into_iter().map(EventRow::from).collect())
    }

    /// Change records at or after `since` (all when `None`), oldest first.
    pub fn changes_since(&self, since: Option<NaiveDateTime>) -> RepoResult<Vec<ChangeRecord>> {
        let changes = self.repo.list_changes(since)?;
        info!(
            "event=query module=query kind=changes_since status=ok rows={}",
            changes.len()
        );
        Ok(changes)
    }

    /// Every stored event, retired included, by first observation.
    pub fn all_events(&self) -> RepoResult<Vec<Event>> {
        self.repo.list_events(true)
    }

    /// Newest change records first.
    pub fn recent_changes(&self, limit: u32) -> RepoResult<Vec<ChangeRecord>> {
        self.repo.recent_changes(limit)
    }
}

/// Parses a `YYYY-MM-DD` argument.
pub fn parse_date_arg(value: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| QueryError::InvalidDate(value.to_string()))
}

/// Parses `<N>h` (N hours before `now`) or an ISO date/datetime.
pub fn parse_since(value: &str, now: NaiveDateTime) -> Result<NaiveDateTime, QueryError> {
    let trimmed = value.trim();

    if let Some(caps) = SINCE_HOURS_RE.captures(trimmed) {
        let hours: i64 = caps[1]
            .parse()
            .map_err(|_| QueryError::InvalidSince(value.to_string()))?;
        let delta = Duration::try_hours(hours)
            .ok_or_else(|| QueryError::InvalidSince(value.to_string()))?;
        return now
            .checked_sub_signed(delta)
            .ok_or_else(|| QueryError::InvalidSince(value.to_string()));
    }

    for format in SINCE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| QueryError::InvalidSince(value.to_string()))
}
