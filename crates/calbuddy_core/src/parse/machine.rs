//! Line-driven event parser.
//!
//! # Responsibility
//! - Segment listing lines into event blocks at bullet title markers.
//! - Extract one start/end span per block using prioritized line rules.
//! - Emit one candidate per block through an explicit finalize transition.
//!
//! # Invariants
//! - States are `Idle` (no block yet) and `InBlock`.
//! - Rules are evaluated in fixed priority; the first rule that parses wins.
//! - A rule whose pattern matches but whose values do not parse falls through.
//! - Lines seen while `Idle` are ignored.

use crate::model::event::CandidateEvent;
use crate::parse::datetime::{parse_date, parse_time_token, MalformedDateTime, TimeSpan};
use crate::parse::link::extract_meeting_link;
use crate::parse::normalize::normalize_line;
use chrono::NaiveDate;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

const TIME_TOKEN: &str = r"\d{1,2}:\d{2}(?:\s*[AaPp]\.?\s*[Mm]\b\.?)?";

static TITLE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[•*]\s*").expect("valid title marker regex"));
static CALENDAR_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]*@[^)]*\)$").expect("valid calendar suffix regex"));
static DATE_RANGE_WORDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2}(?:st|nd|rd|th)?\s+[A-Za-z]{3,9}\s+\d{4})\s*-\s*(\d{1,2}(?:st|nd|rd|th)?\s+[A-Za-z]{3,9}\s+\d{4})",
    )
    .expect("valid worded date range regex")
});
static DATE_RANGE_ISO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})\s*-\s*(\d{4}-\d{2}-\d{2})").expect("valid iso date range regex")
});
static DATED_AT_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(\d{{4}}-\d{{2}}-\d{{2}})\s+at\s+({TIME_TOKEN})\s*-\s*({TIME_TOKEN})"
    ))
    .expect("valid dated at-range regex")
});
static TIME_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:(\d{{4}}-\d{{2}}-\d{{2}})\s+)?({TIME_TOKEN})\s*-\s*({TIME_TOKEN})"
    ))
    .expect("valid time range regex")
});
static BARE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid bare date regex"));

/// Line rules in evaluation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanRule {
    /// `15 Sep 2025 - 29 Sep 2025` or `2025-09-15 - 2025-09-29`.
    DateRange,
    /// `2025-11-02 at 11:30 AM - 12:00 PM`.
    DatedAtRange,
    /// `[2025-10-21 ]11:30 AM - 12:00 PM`.
    TimeRange,
    /// `2025-10-21` alone on the line.
    BareDate,
}

impl SpanRule {
    pub const PRIORITY: [SpanRule; 4] = [
        SpanRule::DateRange,
        SpanRule::DatedAtRange,
        SpanRule::TimeRange,
        SpanRule::BareDate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DateRange => "date_range",
            Self::DatedAtRange => "dated_at_range",
            Self::TimeRange => "time_range",
            Self::BareDate => "bare_date",
        }
    }

    /// Applies this rule to one line.
    ///
    /// Returns `None` when the pattern does not occur, `Some(Err)` when it
    /// occurs but its values do not parse.
    fn apply(self, line: &str, today: NaiveDate) -> Option<Result<TimeSpan, MalformedDateTime>> {
        match self {
            Self::DateRange => {
                let mut outcome = None;
                for regex in [&*DATE_RANGE_WORDS_RE, &*DATE_RANGE_ISO_RE] {
                    let Some(caps) = regex.captures(line) else {
                        continue;
                    };
                    match (parse_date(&caps[1]), parse_date(&caps[2])) {
                        (Ok(first), Ok(last)) => {
                            return Some(Ok(TimeSpan::whole_days(first, last)));
                        }
                        (Err(err), _) | (_, Err(err)) => outcome = Some(Err(err)),
                    }
                }
                outcome
            }
            Self::DatedAtRange => {
                let caps = DATED_AT_RANGE_RE.captures(line)?;
                Some(resolve_time_range(&caps[1], &caps[2], &caps[3]))
            }
            Self::TimeRange => {
                let caps = TIME_RANGE_RE.captures(line)?;
                let start = parse_time_token(&caps[2]);
                let end = parse_time_token(&caps[3]);
                let date = match caps.get(1) {
                    Some(prefix) => parse_date(prefix.as_str()),
                    None => Ok(today),
                };
                Some(match (date, start, end) {
                    (Ok(date), Ok(start), Ok(end)) => Ok(TimeSpan::on_date(date, start, end)),
                    (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => Err(err),
                })
            }
            Self::BareDate => {
                let trimmed = line.trim();
                if !BARE_DATE_RE.is_match(trimmed) {
                    return None;
                }
                Some(parse_date(trimmed).map(|date| TimeSpan::whole_days(date, date)))
            }
        }
    }
}

fn resolve_time_range(
    date: &str,
    start: &str,
    end: &str,
) -> Result<TimeSpan, MalformedDateTime> {
    let date = parse_date(date)?;
    let start = parse_time_token(start)?;
    let end = parse_time_token(end)?;
    Ok(TimeSpan::on_date(date, start, end))
}

/// Result of evaluating every rule against one line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleOutcome {
    /// First rule that produced a span.
    pub matched: Option<(SpanRule, TimeSpan)>,
    /// Higher-priority rules that matched the pattern but failed to parse.
    pub malformed: Vec<(SpanRule, MalformedDateTime)>,
}

/// Evaluates the span rules against one normalized line in priority order.
pub fn evaluate_rules(line: &str, today: NaiveDate) -> RuleOutcome {
    let mut outcome = RuleOutcome::default();
    for rule in SpanRule::PRIORITY {
        match rule.apply(line, today) {
            Some(Ok(span)) => {
                outcome.matched = Some((rule, span));
                break;
            }
            Some(Err(err)) => outcome.malformed.push((rule, err)),
            None => {}
        }
    }
    outcome
}

/// Event block under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBlock {
    pub title: String,
    pub lines: Vec<String>,
    pub span: Option<TimeSpan>,
}

impl EventBlock {
    fn open(title: String) -> Self {
        Self {
            title,
            lines: Vec::new(),
            span: None,
        }
    }

    /// Closes the block into a candidate, resolving its meeting link.
    pub fn finalize(self) -> CandidateEvent {
        let meeting_link = extract_meeting_link(&self.lines);
        CandidateEvent {
            title: self.title,
            start: self.span.map(|span| span.start),
            end: self.span.map(|span| span.end),
            meeting_link,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Idle,
    InBlock(EventBlock),
}

/// Incremental listing parser.
///
/// Feed normalized or raw lines one at a time; each title marker finalizes
/// the previous block. Call [`EventParser::finish`] to flush the last block.
#[derive(Debug, Clone)]
pub struct EventParser {
    today: NaiveDate,
    state: ParserState,
}

impl EventParser {
    /// `today` resolves time ranges that carry no date.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            state: ParserState::Idle,
        }
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Consumes one line. Returns the candidate finalized by this line, if any.
    pub fn feed(&mut self, raw: &str) -> Option<CandidateEvent> {
        let normalized = normalize_line(raw);
        let line = normalized.trim_end();
        if line.is_empty() {
            return None;
        }

        if let Some(marker) = TITLE_MARKER_RE.find(line) {
            let finalized = self.finalize();
            let title = CALENDAR_SUFFIX_RE
                .replace(line[marker.end()..].trim(), "")
                .trim()
                .to_string();
            self.state = ParserState::InBlock(EventBlock::open(title));
            return finalized;
        }

        let ParserState::InBlock(block) = &mut self.state else {
            return None;
        };
        block.lines.push(line.to_string());

        let outcome = evaluate_rules(line, self.today);
        for (rule, err) in &outcome.malformed {
            debug!(
                "event=parse_line module=parse status=skipped rule={} reason=malformed_datetime detail={}",
                rule.name(),
                err
            );
        }
        if let Some((_, span)) = outcome.matched {
            block.span = Some(span);
        }
        None
    }

    /// Explicit finalize transition: `InBlock -> Idle`, emitting the block.
    pub fn finalize(&mut self) -> Option<CandidateEvent> {
        match std::mem::take(&mut self.state) {
            ParserState::InBlock(block) => Some(block.finalize()),
            ParserState::Idle => None,
        }
    }

    /// Flushes the active block at end of input.
    pub fn finish(mut self) -> Option<CandidateEvent> {
        self.finalize()
    }
}

/// Parses a whole listing into candidates in listing order.
pub fn parse_lines<I, S>(lines: I, today: NaiveDate) -> Vec<CandidateEvent>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = EventParser::new(today);
    let mut candidates = Vec::new();
    let mut line_count = 0usize;

    for line in lines {
        line_count += 1;
        candidates.extend(parser.feed(line.as_ref()));
    }
    candidates.extend(parser.finish());

    let untimed = candidates
        .iter()
        .filter(|candidate| candidate.start.is_none())
        .count();
    info!(
        "event=parse_listing module=parse status=ok lines={} events={} untimed={}",
        line_count,
        candidates.len(),
        untimed
    );
    candidates
}

/// Parses raw listing text; see [`parse_lines`].
pub fn parse_text(raw: &str, today: NaiveDate) -> Vec<CandidateEvent> {
    parse_lines(raw.lines(), today)
}
