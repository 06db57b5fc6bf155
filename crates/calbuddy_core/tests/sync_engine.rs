use calbuddy_core::db::open_db_in_memory;
use calbuddy_core::model::event::parse_event_time;
use calbuddy_core::{
    CandidateEvent, ChangeAction, EventStore, FileSource, LookbackWindow, SourceError,
    SqliteEventStore, SyncEngine, SyncError, SyncOptions,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

fn ts(value: &str) -> NaiveDateTime {
    parse_event_time(value).unwrap()
}

fn standup() -> CandidateEvent {
    CandidateEvent::new(
        "Standup",
        Some(ts("2025-10-21T09:00:00")),
        Some(ts("2025-10-21T09:15:00")),
        Some("https://zoom.us/j/1".to_string()),
    )
}

fn candidate(title: &str, start: &str, end: &str) -> CandidateEvent {
    CandidateEvent::new(title, Some(ts(start)), Some(ts(end)), None)
}

const FULL: SyncOptions = SyncOptions {
    partial_window: false,
    dry_run: false,
};
const PARTIAL: SyncOptions = SyncOptions {
    partial_window: true,
    dry_run: false,
};

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn standup_is_added_refreshed_then_removed() {
    let mut conn = open_db_in_memory().unwrap();

    let first = SyncEngine::new(&mut conn)
        .sync_at(&[standup()], FULL, ts("2025-10-21T08:00:00"))
        .unwrap();
    assert_eq!(first.added, 1);
    assert_eq!(first.change_records, 1);

    let second = SyncEngine::new(&mut conn)
        .sync_at(&[standup()], FULL, ts("2025-10-21T08:30:00"))
        .unwrap();
    assert_eq!(second.refreshed, 1);
    assert_eq!(second.change_records, 0);

    {
        let store = SqliteEventStore::new(&conn);
        let event = store.get_event(&standup().identity()).unwrap().unwrap();
        assert_eq!(event.first_seen, ts("2025-10-21T08:00:00"));
        assert_eq!(event.last_seen, ts("2025-10-21T08:30:00"));
        assert!(event.is_active());
        assert_eq!(store.list_changes(None).unwrap().len(), 1);
    }

    let third = SyncEngine::new(&mut conn)
        .sync_at(&[], FULL, ts("2025-10-22T08:00:00"))
        .unwrap();
    assert_eq!(third.removed, 1);
    assert_eq!(third.retired, 1);

    let store = SqliteEventStore::new(&conn);
    assert!(store.list_active_events().unwrap().is_empty());
    let changes = store.list_changes(None).unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].action, ChangeAction::Added);
    let removed = &changes[1];
    assert_eq!(removed.action, ChangeAction::Removed);
    assert_eq!(removed.title, "Standup");
    assert_eq!(removed.start, Some(ts("2025-10-21T09:00:00")));
    assert_eq!(removed.end, Some(ts("2025-10-21T09:15:00")));
    assert_eq!(removed.meeting_link.as_deref(), Some("https://zoom.us/j/1"));
    assert!(removed.sequence > changes[0].sequence);
}

#[test]
fn partial_window_never_removes_unlisted_events() {
    let mut conn = open_db_in_memory().unwrap();
    SyncEngine::new(&mut conn)
        .sync_at(&[standup()], FULL, ts("2025-10-21T08:00:00"))
        .unwrap();

    let report = SyncEngine::new(&mut conn)
        .sync_at(&[], PARTIAL, ts("2025-10-21T09:00:00"))
        .unwrap();
    assert_eq!(report.removed, 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM events WHERE retired = 0;"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM changes;"), 1);
}

#[test]
fn rescheduled_event_supersedes_same_title_predecessor() {
    let mut conn = open_db_in_memory().unwrap();
    let old = candidate("Design review", "2025-10-21T14:00:00", "2025-10-21T15:00:00");
    let moved = candidate("Design review", "2025-10-21T16:00:00", "2025-10-21T17:00:00");

    SyncEngine::new(&mut conn)
        .sync_at(&[old.clone()], PARTIAL, ts("2025-10-21T08:00:00"))
        .unwrap();
    let report = SyncEngine::new(&mut conn)
        .sync_at(&[moved.clone()], PARTIAL, ts("2025-10-21T09:00:00"))
        .unwrap();
    assert_eq!(report.superseded, 1);
    assert_eq!(report.added_as_update, 1);
    assert_eq!(report.retired, 1);

    let store = SqliteEventStore::new(&conn);
    let active = store.list_active_events().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].identity, moved.identity());

    let actions: Vec<ChangeAction> = store
        .list_changes(None)
        .unwrap()
        .into_iter()
        .map(|change| change.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            ChangeAction::Added,
            ChangeAction::Superseded,
            ChangeAction::AddedAsUpdate
        ]
    );
}

#[test]
fn recurring_title_listed_in_same_pass_is_not_superseded() {
    let mut conn = open_db_in_memory().unwrap();
    let monday = candidate("Standup", "2025-10-20T09:00:00", "2025-10-20T09:15:00");
    let tuesday = candidate("Standup", "2025-10-21T09:00:00", "2025-10-21T09:15:00");

    SyncEngine::new(&mut conn)
        .sync_at(&[monday.clone()], FULL, ts("2025-10-20T08:00:00"))
        .unwrap();
    let report = SyncEngine::new(&mut conn)
        .sync_at(&[tuesday, monday], PARTIAL, ts("2025-10-21T08:00:00"))
        .unwrap();

    assert_eq!(report.superseded, 0);
    assert_eq!(report.added, 1);
    assert_eq!(report.refreshed, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM events WHERE retired = 0;"), 2);
}

#[test]
fn retired_identity_is_never_reactivated() {
    let mut conn = open_db_in_memory().unwrap();
    SyncEngine::new(&mut conn)
        .sync_at(&[standup()], FULL, ts("2025-10-21T08:00:00"))
        .unwrap();
    SyncEngine::new(&mut conn)
        .sync_at(&[], FULL, ts("2025-10-21T09:00:00"))
        .unwrap();

    let report = SyncEngine::new(&mut conn)
        .sync_at(&[standup()], FULL, ts("2025-10-21T10:00:00"))
        .unwrap();
    assert_eq!(report.ignored_retired, 1);
    assert_eq!(report.change_records, 0);

    let store = SqliteEventStore::new(&conn);
    let event = store.get_event(&standup().identity()).unwrap().unwrap();
    assert!(event.retired);
    assert_eq!(event.last_seen, ts("2025-10-21T09:00:00"));
}

#[test]
fn dry_run_reports_plan_and_writes_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let options = SyncOptions {
        partial_window: false,
        dry_run: true,
    };

    let report = SyncEngine::new(&mut conn)
        .sync_at(&[standup()], options, ts("2025-10-21T08:00:00"))
        .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.added, 1);
    assert_eq!(report.change_records, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM events;"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM changes;"), 0);
}

#[test]
fn link_change_overwrites_without_change_record() {
    let mut conn = open_db_in_memory().unwrap();
    SyncEngine::new(&mut conn)
        .sync_at(&[standup()], FULL, ts("2025-10-21T08:00:00"))
        .unwrap();

    let mut relinked = standup();
    relinked.meeting_link = Some("https://meet.google.com/abc-defg-hij".to_string());
    let report = SyncEngine::new(&mut conn)
        .sync_at(&[relinked], FULL, ts("2025-10-21T08:30:00"))
        .unwrap();
    assert_eq!(report.refreshed, 1);
    assert_eq!(report.change_records, 0);

    let store = SqliteEventStore::new(&conn);
    let event = store.get_event(&standup().identity()).unwrap().unwrap();
    assert_eq!(
        event.meeting_link.as_deref(),
        Some("https://meet.google.com/abc-defg-hij")
    );
    assert_eq!(store.list_changes(None).unwrap().len(), 1);
}

#[test]
fn change_records_of_one_run_share_timestamp_and_increase_in_sequence() {
    let mut conn = open_db_in_memory().unwrap();
    let now = ts("2025-10-21T08:00:00");
    let candidates = [
        candidate("A", "2025-10-21T09:00:00", "2025-10-21T10:00:00"),
        candidate("B", "2025-10-21T11:00:00", "2025-10-21T12:00:00"),
        candidate("C", "2025-10-21T13:00:00", "2025-10-21T14:00:00"),
    ];
    SyncEngine::new(&mut conn)
        .sync_at(&candidates, FULL, now)
        .unwrap();

    let changes = SqliteEventStore::new(&conn).list_changes(None).unwrap();
    assert_eq!(changes.len(), 3);
    assert!(changes.iter().all(|change| change.recorded_at == now));
    let titles: Vec<&str> = changes.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "B", "C"]);
    assert!(changes.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[test]
fn sync_from_file_source_parses_and_reconciles() {
    let dir = tempfile::tempdir().unwrap();
    let listing = dir.path().join("listing.txt");
    std::fs::write(
        &listing,
        "• Standup (work@example.com)\n    10:00 AM - 10:15 AM\n    location: https://zoom.us/j/1\n• Focus\n",
    )
    .unwrap();

    let mut conn = open_db_in_memory().unwrap();
    let today = NaiveDate::from_ymd_opt(2025, 10, 21).unwrap();
    let report = SyncEngine::new(&mut conn)
        .sync_from_source_at(
            &FileSource::new(&listing),
            &LookbackWindow::new(today, 3),
            false,
            ts("2025-10-21T08:00:00"),
        )
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.added, 2);
    assert!(report.partial_window);

    let active = SqliteEventStore::new(&conn).list_active_events().unwrap();
    let standup = active.iter().find(|event| event.title == "Standup").unwrap();
    assert_eq!(standup.start, Some(ts("2025-10-21T10:00:00")));
    assert_eq!(standup.meeting_link.as_deref(), Some("https://zoom.us/j/1"));
}

#[test]
fn unavailable_source_aborts_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_db_in_memory().unwrap();
    SyncEngine::new(&mut conn)
        .sync_at(&[standup()], FULL, ts("2025-10-21T08:00:00"))
        .unwrap();

    let today = NaiveDate::from_ymd_opt(2025, 10, 21).unwrap();
    let err = SyncEngine::new(&mut conn)
        .sync_from_source_at(
            &FileSource::new(dir.path().join("missing.txt")),
            &LookbackWindow::new(today, 0),
            false,
            ts("2025-10-21T09:00:00"),
        )
        .unwrap_err();
    assert!(matches!(err, SyncError::Source(SourceError::Io { .. })));

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM events WHERE retired = 0;"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM changes;"), 1);
}

fn fail_change_log_for(conn: &Connection, title: &str) {
    conn.execute_batch(&format!(
        "CREATE TRIGGER changes_fail_for_title
         BEFORE INSERT ON changes
         WHEN NEW.title = '{title}'
         BEGIN
             SELECT RAISE(ABORT, 'change log unavailable');
         END;"
    ))
    .unwrap();
}

#[test]
fn storage_failure_mid_run_rolls_back_every_step() {
    let mut conn = open_db_in_memory().unwrap();
    fail_change_log_for(&conn, "Boom");

    let candidates = [
        candidate("A", "2025-10-21T09:00:00", "2025-10-21T10:00:00"),
        candidate("Boom", "2025-10-21T11:00:00", "2025-10-21T12:00:00"),
    ];
    let err = SyncEngine::new(&mut conn)
        .sync_at(&candidates, FULL, ts("2025-10-21T08:00:00"))
        .unwrap_err();
    assert!(err.to_string().contains("change log unavailable"));

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM events;"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM changes;"), 0);
}

#[test]
fn failed_full_pass_keeps_previous_state() {
    let mut conn = open_db_in_memory().unwrap();
    SyncEngine::new(&mut conn)
        .sync_at(&[standup()], FULL, ts("2025-10-21T08:00:00"))
        .unwrap();
    fail_change_log_for(&conn, "Boom");

    let result = SyncEngine::new(&mut conn).sync_at(
        &[candidate("Boom", "2025-10-21T11:00:00", "2025-10-21T12:00:00")],
        FULL,
        ts("2025-10-21T09:00:00"),
    );
    assert!(result.is_err());

    let store = SqliteEventStore::new(&conn);
    let active = store.list_active_events().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].identity, standup().identity());
    assert_eq!(active[0].last_seen, ts("2025-10-21T08:00:00"));
    assert_eq!(store.list_changes(None).unwrap().len(), 1);
}
