//! Core logic for CalendarBuddy.
//!
//! Turns icalBuddy-style text listings into calendar events and keeps a
//! SQLite store of them in step with an append-only change log.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod parse;
pub mod repo;
pub mod service;
pub mod source;
pub mod sync;

pub use config::{BuddyConfig, ConfigError, SourceConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::event::{CandidateEvent, ChangeAction, ChangeRecord, Event};
pub use model::identity::EventIdentity;
pub use parse::machine::{parse_lines, parse_text, EventParser};
pub use repo::event_repo::{
    DateWindow, EventStore, RepoError, RepoResult, SqliteEventStore,
};
pub use service::query_service::{
    parse_date_arg, parse_since, EventRow, QueryError, QueryService,
};
pub use source::{FileSource, IcalBuddySource, ListingSource, LookbackWindow, SourceError};
pub use sync::engine::{SyncEngine, SyncError, SyncReport};
pub use sync::plan::SyncOptions;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
