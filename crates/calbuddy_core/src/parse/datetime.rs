//! Date and time token parsing for listing lines.
//!
//! # Responsibility
//! - Turn date fragments (`15 Sep 2025`, `2025-09-15`) into calendar dates.
//! - Turn time tokens (`9:05`, `11:30 AM`, `4:00 p.m.`) into 24-hour times.
//! - Build whole-day and same-day spans.
//!
//! # Invariants
//! - Whole-day spans run from 00:00:00 on the first day to 23:59:59 on the last.
//! - No timezone is attached or converted; values are wall-clock as listed.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static ORDINAL_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)(st|nd|rd|th)\b").expect("valid ordinal regex"));
static TIME_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2}):(\d{2})(?:\s*([ap])\.?\s*m\.?)?$").expect("valid time token regex")
});

const DATE_FORMATS: [&str; 5] = ["%d %b %Y", "%d %B %Y", "%Y-%m-%d", "%b %d %Y", "%B %d %Y"];

/// A line fragment that looked like a date or time but did not parse.
///
/// Never fatal: the parser logs it and tries the next rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedDateTime {
    pub fragment: String,
    pub reason: &'static str,
}

impl MalformedDateTime {
    pub fn new(fragment: impl Into<String>, reason: &'static str) -> Self {
        Self {
            fragment: fragment.into(),
            reason,
        }
    }
}

impl Display for MalformedDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed date/time `{}`: {}", self.fragment, self.reason)
    }
}

impl Error for MalformedDateTime {}

/// Start/end pair extracted from one listing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeSpan {
    /// Covers `first` 00:00:00 through `last` 23:59:59.
    pub fn whole_days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: first.and_time(NaiveTime::MIN),
            end: last.and_time(end_of_day()),
        }
    }

    /// Resolves both times against the same date.
    pub fn on_date(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: date.and_time(start),
            end: date.and_time(end),
        }
    }
}

/// Parses `15 Sep 2025`, `15th September 2025`, `Sep 15 2025` or `2025-09-15`.
pub fn parse_date(fragment: &str) -> Result<NaiveDate, MalformedDateTime> {
    let trimmed = fragment.trim();
    if trimmed.is_empty() {
        return Err(MalformedDateTime::new(fragment, "empty date"));
    }

    let cleaned = ORDINAL_SUFFIX_RE.replace_all(trimmed, "$1");
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Ok(date);
        }
    }

    NaiveDateTime::parse_from_str(&cleaned, "%Y-%m-%dT%H:%M:%S")
        .map(|value| value.date())
        .map_err(|_| MalformedDateTime::new(fragment, "unrecognized date"))
}

/// Parses a time token into a 24-hour time.
///
/// Accepts `H:MM` and `H:MM AM/PM` with optional periods and spaces around
/// the meridiem. With a meridiem, `12` maps to noon/midnight and hours above
/// 12 are taken as already 24-hour.
pub fn parse_time_token(token: &str) -> Result<NaiveTime, MalformedDateTime> {
    let trimmed = token.trim();
    let caps = TIME_TOKEN_RE
        .captures(trimmed)
        .ok_or_else(|| MalformedDateTime::new(token, "unrecognized time"))?;

    let hour: u32 = caps[1]
        .parse()
        .map_err(|_| MalformedDateTime::new(token, "invalid hour"))?;
    let minute: u32 = caps[2]
        .parse()
        .map_err(|_| MalformedDateTime::new(token, "invalid minute"))?;

    let hour = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(meridiem) if (1..=12).contains(&hour) => match (meridiem.as_str(), hour) {
            ("a", 12) => 0,
            ("p", 12) => 12,
            ("p", h) => h + 12,
            (_, h) => h,
        },
        _ => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| MalformedDateTime::new(token, "time out of range"))
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}
