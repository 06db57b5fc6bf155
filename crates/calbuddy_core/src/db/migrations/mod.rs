//! Event store migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//! - Carry stores from the first CalendarBuddy release into the current schema.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A legacy import happens in the same transaction as the migrations, so a
//!   failed upgrade leaves the old file untouched.

use crate::db::{DbError, DbResult};
use chrono::{Local, NaiveDateTime};
use log::info;
use rusqlite::Connection;

mod legacy;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_guards.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    apply_migrations_at(conn, Local::now().naive_local())
}

/// Like [`apply_migrations`]; `now` stands in for legacy rows that lack
/// observation timestamps.
pub fn apply_migrations_at(conn: &mut Connection, now: NaiveDateTime) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let legacy = if current_version == 0 {
        legacy::lift(&tx)?
    } else {
        None
    };

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }

    if let Some(store) = legacy {
        let imported = legacy::restore(&tx, store, now)?;
        info!(
            "event=db_legacy_import module=db status=ok events={} changes={} skipped={}",
            imported.events, imported.changes, imported.skipped
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        current_version, latest
    );
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
