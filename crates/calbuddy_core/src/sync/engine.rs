//! Transactional sync engine.
//!
//! # Responsibility
//! - Load the stored snapshot, plan the pass, apply it in one transaction.
//! - Report what the pass did (or would do, for dry runs).
//!
//! # Invariants
//! - Every mutation of one run commits together or not at all.
//! - Dry runs produce the same report as a real run and write nothing.
//! - All change records of one run share the run timestamp.

use crate::model::event::{CandidateEvent, ChangeAction, Event, NewChangeRecord};
use crate::parse::machine::parse_lines;
use crate::repo::event_repo::{EventStore, RepoError, RepoResult, SqliteEventStore};
use crate::source::{ListingSource, LookbackWindow, SourceError};
use crate::sync::plan::{reconcile, SyncOptions, SyncPlan, SyncStep};
use chrono::{Local, NaiveDateTime};
use log::{debug, error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// A full fetch-parse-sync pass failed.
#[derive(Debug)]
pub enum SyncError {
    /// The listing could not be obtained; nothing was reconciled.
    Source(SourceError),
    /// Storage failed mid-run; the transaction was rolled back.
    Storage(RepoError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(err) => write!(f, "listing source unavailable: {err}"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

impl From<RepoError> for SyncError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

/// Summary of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Correlates log lines of one run.
    pub run_id: Uuid,
    /// Candidates processed.
    pub processed: usize,
    pub added: usize,
    pub added_as_update: usize,
    pub superseded: usize,
    pub removed: usize,
    /// Superseded plus removed.
    pub retired: usize,
    pub refreshed: usize,
    pub ignored_retired: usize,
    /// Change records appended (or that would be, on a dry run).
    pub change_records: usize,
    pub partial_window: bool,
    pub dry_run: bool,
}

impl SyncReport {
    fn from_plan(run_id: Uuid, plan: &SyncPlan, options: SyncOptions) -> Self {
        Self {
            run_id,
            processed: plan.processed,
            added: plan.count_action(ChangeAction::Added),
            added_as_update: plan.count_action(ChangeAction::AddedAsUpdate),
            superseded: plan.count_action(ChangeAction::Superseded),
            removed: plan.count_action(ChangeAction::Removed),
            retired: plan.retirements(),
            refreshed: plan.refreshed(),
            ignored_retired: plan.ignored_retired,
            change_records: plan.change_records(),
            partial_window: options.partial_window,
            dry_run: options.dry_run,
        }
    }
}

/// Reconciles parsed candidates into a SQLite event store.
pub struct SyncEngine<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SyncEngine<'conn> {
    /// `conn` must come from [`crate::db::open_db`] or
    /// [`crate::db::open_db_in_memory`].
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Runs one pass stamped with the local wall-clock time.
    pub fn sync(
        &mut self,
        candidates: &[CandidateEvent],
        options: SyncOptions,
    ) -> RepoResult<SyncReport> {
        self.sync_at(candidates, options, Local::now().naive_local())
    }

    /// Runs one pass stamped with `now`.
    ///
    /// # Errors
    /// - Returns the storage error that aborted the run; nothing is committed.
    pub fn sync_at(
        &mut self,
        candidates: &[CandidateEvent],
        options: SyncOptions,
        now: NaiveDateTime,
    ) -> RepoResult<SyncReport> {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        info!(
            "event=sync_run module=sync status=start run_id={} candidates={} partial_window={} dry_run={}",
            run_id,
            candidates.len(),
            options.partial_window,
            options.dry_run
        );

        match self.run_in_transaction(candidates, options, now) {
            Ok(plan) => {
                let report = SyncReport::from_plan(run_id, &plan, options);
                info!(
                    "event=sync_run module=sync status=ok run_id={} duration_ms={} processed={} added={} added_as_update={} superseded={} removed={} refreshed={} ignored_retired={} dry_run={}",
                    run_id,
                    started_at.elapsed().as_millis(),
                    report.processed,
                    report.added,
                    report.added_as_update,
                    report.superseded,
                    report.removed,
                    report.refreshed,
                    report.ignored_retired,
                    report.dry_run
                );
                if report.ignored_retired > 0 {
                    warn!(
                        "event=sync_run module=sync status=warn run_id={} ignored_retired={} error_code=retired_identity_listed",
                        run_id, report.ignored_retired
                    );
                }
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=sync_run module=sync status=error run_id={} duration_ms={} error_code=sync_rolled_back error={}",
                    run_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Fetches `window` from `source`, parses it and reconciles the result.
    ///
    /// A look-back window longer than today makes the pass partial.
    pub fn sync_from_source<S: ListingSource + ?Sized>(
        &mut self,
        source: &S,
        window: &LookbackWindow,
        dry_run: bool,
    ) -> Result<SyncReport, SyncError> {
        self.sync_from_source_at(source, window, dry_run, Local::now().naive_local())
    }

    pub fn sync_from_source_at<S: ListingSource + ?Sized>(
        &mut self,
        source: &S,
        window: &LookbackWindow,
        dry_run: bool,
        now: NaiveDateTime,
    ) -> Result<SyncReport, SyncError> {
        let lines = source.fetch_lines(window).map_err(|err| {
            error!(
                "event=source_fetch module=source status=error source={} error={}",
                source.name(),
                err
            );
            err
        })?;
        let candidates = parse_lines(&lines, window.today);
        let options = SyncOptions {
            partial_window: window.is_partial(),
            dry_run,
        };
        Ok(self.sync_at(&candidates, options, now)?)
    }

    fn run_in_transaction(
        &mut self,
        candidates: &[CandidateEvent],
        options: SyncOptions,
        now: NaiveDateTime,
    ) -> RepoResult<SyncPlan> {
        let behavior = if options.dry_run {
            TransactionBehavior::Deferred
        } else {
            TransactionBehavior::Immediate
        };
        let tx = self.conn.transaction_with_behavior(behavior)?;
        let plan = plan_and_apply(&tx, candidates, options, now)?;

        if options.dry_run {
            tx.rollback()?;
        } else {
            tx.commit()?;
        }
        Ok(plan)
    }
}

fn plan_and_apply(
    tx: &Transaction<'_>,
    candidates: &[CandidateEvent],
    options: SyncOptions,
    now: NaiveDateTime,
) -> RepoResult<SyncPlan> {
    let store = SqliteEventStore::new(tx);
    let snapshot = store.list_events(true)?;
    let plan = reconcile(&snapshot, candidates, options.partial_window);

    if !options.dry_run {
        apply_plan(&store, &plan, now)?;
    }
    Ok(plan)
}

/// Applies `plan` through any event store, in step order.
///
/// Callers own transaction scope; a failing step leaves earlier steps for the
/// caller to roll back.
pub fn apply_plan<S: EventStore>(store: &S, plan: &SyncPlan, now: NaiveDateTime) -> RepoResult<()> {
    for step in &plan.steps {
        match step {
            SyncStep::Refresh {
                identity,
                meeting_link,
            } => {
                store.touch_event(identity, now, meeting_link.as_deref())?;
                debug!(
                    "event=sync_step module=sync action=refresh identity={}",
                    identity
                );
            }
            SyncStep::Create { candidate, action } => {
                let event = Event::first_observed(candidate, now);
                store.upsert_event(&event)?;
                let sequence =
                    store.append_change(&NewChangeRecord::snapshot(*action, &event, now))?;
                debug!(
                    "event=sync_step module=sync action={} identity={} sequence={} title={}",
                    action.as_db_str(),
                    event.identity,
                    sequence,
                    event.title
                );
            }
            SyncStep::Retire { event, action } => {
                store.retire_event(&event.identity, now)?;
                let sequence =
                    store.append_change(&NewChangeRecord::snapshot(*action, event, now))?;
                debug!(
                    "event=sync_step module=sync action={} identity={} sequence={}",
                    action.as_db_str(),
                    event.identity,
                    sequence
                );
            }
        }
    }
    Ok(())
}
