//! Ordered schema migrations for the roster database.
//!
//! # Invariants
//! - Versions start at 1 and increase by exactly one per entry.
//! - All pending steps run in one transaction; `user_version` moves with them.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// `(version, script)` pairs in application order.
const MIGRATIONS: &[(u32, &str)] = &[(1, include_str!("0001_students.sql"))];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

/// Reads the schema version recorded on `conn`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Migrates `conn` to [`latest_version`], returning how many steps ran.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let from = current_user_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|(version, _)| *version > from)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for (version, script) in &pending {
        tx.execute_batch(script)
            .and_then(|()| tx.pragma_update(None, "user_version", version))
            .map_err(|source| DbError::MigrationFailed {
                version: *version,
                source,
            })?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={} steps={}",
        from,
        latest,
        pending.len()
    );
    Ok(pending.len())
}
