//! Snapshot reconciliation.
//!
//! # Responsibility
//! - Turn one pass of parsed candidates into add/refresh/supersede/remove
//!   decisions (`plan`).
//! - Apply those decisions atomically with audit records (`engine`).
//!
//! # Invariants
//! - Replaying an unchanged candidate set is a pure refresh: no change records.

pub mod engine;
pub mod plan;
