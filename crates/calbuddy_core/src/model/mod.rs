//! Domain records for calendar snapshots and their audit trail.
//!
//! # Responsibility
//! - Define the canonical event, candidate and change-log structures.
//! - Derive the content identity used as the dedup key.
//!
//! # Invariants
//! - Every stored event is keyed by a content-derived `EventIdentity`.
//! - Retirement is a soft flag; events are never hard-deleted.

pub mod event;
pub mod identity;
