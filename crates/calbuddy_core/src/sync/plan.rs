//! Pure reconciliation of parsed candidates against a stored snapshot.
//!
//! # Responsibility
//! - Decide refresh / add / supersede / remove outcomes for one pass.
//! - Stay free of I/O so every branch is testable and dry runs are exact.
//!
//! # Invariants
//! - A stored retired identity is never reactivated.
//! - Supersession only retires active same-title events whose identity is
//!   absent from the whole candidate list of this pass.
//! - Removal of unobserved events happens only on full (non-partial) passes.
//! - Steps are ordered so each superseded event retires before its successor
//!   is created.

use crate::model::event::{CandidateEvent, ChangeAction, Event};
use crate::model::identity::EventIdentity;
use std::collections::{HashMap, HashSet};

/// Flags for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// The candidates are a look-back slice, not the full current state.
    pub partial_window: bool,
    /// Decide everything, write nothing.
    pub dry_run: bool,
}

/// One mutation decided by [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    /// Repeat observation: bump `last_seen`, overwrite the link. No change record.
    Refresh {
        identity: EventIdentity,
        meeting_link: Option<String>,
    },
    /// First observation of an identity. `action` is `Added` or `AddedAsUpdate`.
    Create {
        candidate: CandidateEvent,
        action: ChangeAction,
    },
    /// Retirement carrying the pre-retirement fields. `action` is
    /// `Superseded` or `Removed`.
    Retire { event: Event, action: ChangeAction },
}

impl SyncStep {
    /// Change-log action this step writes, if any.
    pub fn change_action(&self) -> Option<ChangeAction> {
        match self {
            Self::Refresh { .. } => None,
            Self::Create { action, .. } | Self::Retire { action, .. } => Some(*action),
        }
    }
}

/// Ordered outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub steps: Vec<SyncStep>,
    /// Candidates examined.
    pub processed: usize,
    /// Candidates whose identity is stored but already retired.
    pub ignored_retired: usize,
}

impl SyncPlan {
    pub fn count_action(&self, action: ChangeAction) -> usize {
        self.steps
            .iter()
            .filter(|step| step.change_action() == Some(action))
            .count()
    }

    pub fn refreshed(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, SyncStep::Refresh { .. }))
            .count()
    }

    /// Events this plan retires, superseded or removed.
    pub fn retirements(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.change_action().is_some_and(ChangeAction::retires))
            .count()
    }

    /// Number of change records applying this plan appends.
    pub fn change_records(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.change_action().is_some())
            .count()
    }
}

/// Reconciles `candidates` (listing order) against `snapshot` (every stored
/// event, retired included).
pub fn reconcile(
    snapshot: &[Event],
    candidates: &[CandidateEvent],
    partial_window: bool,
) -> SyncPlan {
    let stored: HashMap<&EventIdentity, &Event> = snapshot
        .iter()
        .map(|event| (&event.identity, event))
        .collect();
    let identities: Vec<EventIdentity> = candidates.iter().map(CandidateEvent::identity).collect();
    let listed: HashSet<&EventIdentity> = identities.iter().collect();

    let mut plan = SyncPlan {
        processed: candidates.len(),
        ..SyncPlan::default()
    };
    let mut created: HashSet<&EventIdentity> = HashSet::new();
    let mut retired_now: HashSet<&EventIdentity> = HashSet::new();

    for (candidate, identity) in candidates.iter().zip(&identities) {
        if created.contains(identity) {
            plan.steps.push(refresh(identity, candidate));
            continue;
        }

        match stored.get(identity) {
            Some(event) if event.retired => plan.ignored_retired += 1,
            Some(_) => plan.steps.push(refresh(identity, candidate)),
            None => {
                let superseded: Vec<&Event> = snapshot
                    .iter()
                    .filter(|event| {
                        event.is_active()
                            && event.title == candidate.title
                            && !listed.contains(&event.identity)
                            && !retired_now.contains(&event.identity)
                    })
                    .collect();

                let action = if superseded.is_empty() {
                    ChangeAction::Added
                } else {
                    for event in superseded {
                        retired_now.insert(&event.identity);
                        plan.steps.push(SyncStep::Retire {
                            event: event.clone(),
                            action: ChangeAction::Superseded,
                        });
                    }
                    ChangeAction::AddedAsUpdate
                };

                created.insert(identity);
                plan.steps.push(SyncStep::Create {
                    candidate: candidate.clone(),
                    action,
                });
            }
        }
    }

    if !partial_window {
        for event in snapshot {
            if event.is_active()
                && !listed.contains(&event.identity)
                && !retired_now.contains(&event.identity)
            {
                plan.steps.push(SyncStep::Retire {
                    event: event.clone(),
                    action: ChangeAction::Removed,
                });
            }
        }
    }

    plan
}

fn refresh(identity: &EventIdentity, candidate: &CandidateEvent) -> SyncStep {
    SyncStep::Refresh {
        identity: identity.clone(),
        meeting_link: candidate.meeting_link.clone(),
    }
}
