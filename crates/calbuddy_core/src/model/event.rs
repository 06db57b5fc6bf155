//! Event, candidate and change-log records.
//!
//! # Responsibility
//! - Define the persisted event snapshot and its append-only audit record.
//! - Define the parser output consumed by the sync engine.
//! - Own the text encodings used for timestamps in storage and identity.
//!
//! # Invariants
//! - `first_seen` never changes after creation.
//! - `retired` only moves from `false` to `true`.
//! - A `ChangeRecord` is a frozen copy of event fields at one transition.

use crate::model::identity::EventIdentity;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Encoding of event start/end values, e.g. `2025-10-21T09:00:00`.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
/// Encoding of observation and change timestamps, fixed-width so text order
/// matches time order.
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub fn format_event_time(value: NaiveDateTime) -> String {
    value.format(EVENT_TIME_FORMAT).to_string()
}

pub fn parse_event_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, EVENT_TIME_FORMAT).ok()
}

pub fn format_record_time(value: NaiveDateTime) -> String {
    value.format(RECORD_TIME_FORMAT).to_string()
}

pub fn parse_record_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// One event as read from a listing, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub title: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub meeting_link: Option<String>,
}

impl CandidateEvent {
    pub fn new(
        title: impl Into<String>,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        meeting_link: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            meeting_link,
        }
    }

    pub fn identity(&self) -> EventIdentity {
        EventIdentity::derive(&self.title, self.start, self.end)
    }
}

/// Persisted event snapshot keyed by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub identity: EventIdentity,
    pub title: String,
    #[serde(with = "event_time_opt")]
    pub start: Option<NaiveDateTime>,
    #[serde(with = "event_time_opt")]
    pub end: Option<NaiveDateTime>,
    pub meeting_link: Option<String>,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub retired: bool,
}

impl Event {
    /// Creates a freshly observed, active event.
    pub fn first_observed(candidate: &CandidateEvent, now: NaiveDateTime) -> Self {
        Self {
            identity: candidate.identity(),
            title: candidate.title.clone(),
            start: candidate.start,
            end: candidate.end,
            meeting_link: candidate.meeting_link.clone(),
            first_seen: now,
            last_seen: now,
            retired: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.retired
    }
}

/// Transition kind recorded in the change log.
///
/// Stored tags stay compatible with existing CalendarBuddy databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    /// New identity with no active same-title predecessor.
    #[serde(rename = "added")]
    Added,
    /// New identity that replaced one or more same-title events.
    #[serde(rename = "added (updated)")]
    AddedAsUpdate,
    /// Event retired because a same-title event with new times appeared.
    #[serde(rename = "updated-old-marked-deleted")]
    Superseded,
    /// Event retired because a full pass no longer lists it.
    #[serde(rename = "removed")]
    Removed,
}

impl ChangeAction {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::AddedAsUpdate => "added (updated)",
            Self::Superseded => "updated-old-marked-deleted",
            Self::Removed => "removed",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "added" => Some(Self::Added),
            "added (updated)" => Some(Self::AddedAsUpdate),
            "updated-old-marked-deleted" => Some(Self::Superseded),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }

    /// Whether this transition retires the referenced event.
    pub fn retires(self) -> bool {
        matches!(self, Self::Superseded | Self::Removed)
    }
}

/// Change-log row ready to append; the store assigns the sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChangeRecord {
    pub recorded_at: NaiveDateTime,
    pub action: ChangeAction,
    pub identity: EventIdentity,
    pub title: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub meeting_link: Option<String>,
}

impl NewChangeRecord {
    /// Freezes the current fields of `event` for `action`.
    pub fn snapshot(action: ChangeAction, event: &Event, recorded_at: NaiveDateTime) -> Self {
        Self {
            recorded_at,
            action,
            identity: event.identity.clone(),
            title: event.title.clone(),
            start: event.start,
            end: event.end,
            meeting_link: event.meeting_link.clone(),
        }
    }
}

/// Immutable change-log entry as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub sequence: i64,
    pub recorded_at: NaiveDateTime,
    pub action: ChangeAction,
    pub identity: EventIdentity,
    pub title: String,
    #[serde(with = "event_time_opt")]
    pub start: Option<NaiveDateTime>,
    #[serde(with = "event_time_opt")]
    pub end: Option<NaiveDateTime>,
    pub meeting_link: Option<String>,
}

/// Serializes optional event times in [`EVENT_TIME_FORMAT`].
mod event_time_opt {
    use super::{format_event_time, parse_event_time};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_str(&format_event_time(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => parse_event_time(&text)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid event time `{text}`"))),
            None => Ok(None),
        }
    }
}
