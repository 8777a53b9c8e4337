//! Database schema and migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < SCHEMA_VERSION {
        info!(
            "Running migrations from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        if current_version < 1 {
            migrate_v1(conn)?;
        }

        set_schema_version(conn, SCHEMA_VERSION)?;
        info!("Migrations complete");
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration to version 1: lock records.
fn migrate_v1(conn: &Connection) -> Result<()> {
    info!("Applying migration v1: Lock records");

    // Locks table - one active record per subject
    conn.execute(
        "CREATE TABLE IF NOT EXISTS locks (
            subject_id TEXT PRIMARY KEY,
            id TEXT NOT NULL,
            locked_at_ms INTEGER NOT NULL,
            duration_hours REAL NOT NULL,
            reason TEXT NOT NULL,
            locked_by TEXT NOT NULL,
            admin_id TEXT,
            expires_at_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Index for the expiry sweep
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_locks_expires ON locks (expires_at_ms)",
        [],
    )?;

    Ok(())
}
