use calbuddy_core::parse::machine::{parse_text, EventParser, ParserState};
use calbuddy_core::CandidateEvent;
use chrono::{NaiveDate, NaiveDateTime};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 21).unwrap()
}

fn ts(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").unwrap()
}

fn only(listing: &str) -> CandidateEvent {
    let mut candidates = parse_text(listing, today());
    assert_eq!(candidates.len(), 1, "expected one candidate: {candidates:?}");
    candidates.remove(0)
}

#[test]
fn worded_date_range_spans_whole_days() {
    let event = only("• Offsite\n    15 Sep 2025 - 29 Sep 2025\n");
    assert_eq!(event.start, Some(ts("2025-09-15T00:00:00")));
    assert_eq!(event.end, Some(ts("2025-09-29T23:59:59")));
}

#[test]
fn ordinal_and_iso_date_ranges_parse() {
    let worded = only("• Conference\n    1st Oct 2025 - 3rd Oct 2025\n");
    assert_eq!(worded.start, Some(ts("2025-10-01T00:00:00")));
    assert_eq!(worded.end, Some(ts("2025-10-03T23:59:59")));

    let iso = only("• Holiday\n    2025-12-24 - 2025-12-26\n");
    assert_eq!(iso.start, Some(ts("2025-12-24T00:00:00")));
    assert_eq!(iso.end, Some(ts("2025-12-26T23:59:59")));
}

#[test]
fn dated_at_range_uses_its_own_date() {
    let event = only("• Review\n    2025-11-02 at 11:30 AM - 12:00 PM\n");
    assert_eq!(event.start, Some(ts("2025-11-02T11:30:00")));
    assert_eq!(event.end, Some(ts("2025-11-02T12:00:00")));
}

#[test]
fn date_prefixed_time_range_uses_prefix_date() {
    let event = only("• Lunch\n    2025-10-21 11:30 AM - 12:00 PM\n");
    assert_eq!(event.start, Some(ts("2025-10-21T11:30:00")));
    assert_eq!(event.end, Some(ts("2025-10-21T12:00:00")));

    let tomorrow = only("• Lunch\n    2025-10-22 11:30 AM - 12:00 PM\n");
    assert_eq!(tomorrow.start, Some(ts("2025-10-22T11:30:00")));
}

#[test]
fn undated_time_range_adopts_today() {
    let event = only("• Lunch\n    11:30 - 12:00\n");
    assert_eq!(event.start, Some(ts("2025-10-21T11:30:00")));
    assert_eq!(event.end, Some(ts("2025-10-21T12:00:00")));
}

#[test]
fn twelve_hour_clock_edges_resolve() {
    let midnight = only("• Backup window\n    12:00 AM - 12:30 AM\n");
    assert_eq!(midnight.start, Some(ts("2025-10-21T00:00:00")));
    assert_eq!(midnight.end, Some(ts("2025-10-21T00:30:00")));

    let evening = only("• Dinner\n    2025-10-22 7:15 pm - 9:00 p.m.\n");
    assert_eq!(evening.start, Some(ts("2025-10-22T19:15:00")));
    assert_eq!(evening.end, Some(ts("2025-10-22T21:00:00")));
}

#[test]
fn bare_date_line_is_all_day() {
    let event = only("• Birthday\n    2025-10-25\n");
    assert_eq!(event.start, Some(ts("2025-10-25T00:00:00")));
    assert_eq!(event.end, Some(ts("2025-10-25T23:59:59")));
}

#[test]
fn malformed_date_falls_through_to_lower_rules() {
    let event = only("• Sync\n    2025-13-45 at 10:00 AM - 11:00 AM\n");
    assert_eq!(event.start, Some(ts("2025-10-21T10:00:00")));
    assert_eq!(event.end, Some(ts("2025-10-21T11:00:00")));
}

#[test]
fn untimed_block_is_kept_without_times() {
    let event = only("• Someday task\n    notes: whenever\n");
    assert_eq!(event.title, "Someday task");
    assert_eq!(event.start, None);
    assert_eq!(event.end, None);
    assert_eq!(event.meeting_link, None);
}

#[test]
fn calendar_suffix_is_stripped_from_title() {
    let event = only("• Standup (work@example.com)\n    10:00 AM - 10:15 AM\n");
    assert_eq!(event.title, "Standup");
}

#[test]
fn provider_priority_beats_line_order() {
    let listing = "\
• Planning
    2025-10-21 at 2:00 PM - 3:00 PM
    notes: agenda https://docs.example.com/agenda.
    backup: https://meet.google.com/abc-defg-hij
    location: https://us02web.zoom.us/j/123456789?pwd=xyz,
";
    let event = only(listing);
    assert_eq!(
        event.meeting_link.as_deref(),
        Some("https://us02web.zoom.us/j/123456789?pwd=xyz")
    );
}

#[test]
fn first_url_wins_without_known_provider() {
    let event = only("• Call\n    notes: https://a.example.com/x and https://b.example.com/y\n");
    assert_eq!(event.meeting_link.as_deref(), Some("https://a.example.com/x"));
}

#[test]
fn blocks_split_at_title_markers_in_listing_order() {
    let listing = "\
header noise before the first event
• First
    09:00 - 09:30
* Second
    2025-10-22
\u{00A0}
• Third
";
    let candidates = parse_text(listing, today());
    let titles: Vec<&str> = candidates.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second", "Third"]);
    assert_eq!(candidates[0].start, Some(ts("2025-10-21T09:00:00")));
    assert_eq!(candidates[1].start, Some(ts("2025-10-22T00:00:00")));
    assert_eq!(candidates[2].start, None);
}

#[test]
fn parser_finalize_transition_returns_to_idle() {
    let mut parser = EventParser::new(today());
    assert_eq!(parser.state(), &ParserState::Idle);

    assert!(parser.feed("• Standup").is_none());
    assert!(matches!(parser.state(), ParserState::InBlock(_)));
    assert!(parser.feed("    10:00 - 10:15").is_none());

    let emitted = parser.feed("• Retro").unwrap();
    assert_eq!(emitted.title, "Standup");
    assert_eq!(emitted.start, Some(ts("2025-10-21T10:00:00")));

    let last = parser.finalize().unwrap();
    assert_eq!(last.title, "Retro");
    assert_eq!(parser.state(), &ParserState::Idle);
    assert!(parser.finalize().is_none());
}
