//! Lock record repository.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use warden_core::locks::{LockRecord, LockedBy};

use crate::error::Result;

/// Repository for lock table operations.
pub struct LocksRepo;

impl LocksRepo {
    /// Insert or replace the record for a subject.
    pub fn upsert(conn: &Connection, record: &LockRecord) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO locks
                (subject_id, id, locked_at_ms, duration_hours, reason, locked_by, admin_id, expires_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.subject_id,
                record.id,
                record.locked_at_ms,
                record.duration_hours,
                record.reason,
                record.locked_by.as_str(),
                record.admin_id,
                record.expires_at_ms,
            ],
        )?;

        Ok(())
    }

    /// Get the record for a subject.
    pub fn get(conn: &Connection, subject_id: &str) -> Result<Option<LockRecord>> {
        let mut stmt = conn.prepare(
            "SELECT subject_id, id, locked_at_ms, duration_hours, reason, locked_by, admin_id, expires_at_ms
             FROM locks WHERE subject_id = ?1",
        )?;

        let record = stmt
            .query_row(params![subject_id], Self::map_row)
            .optional()?;

        Ok(record)
    }

    /// Delete the record for a subject. Returns true if one existed.
    pub fn delete(conn: &Connection, subject_id: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM locks WHERE subject_id = ?1", params![subject_id])?;
        Ok(deleted > 0)
    }

    /// List all records. Rows that fail to decode are skipped with a
    /// warning rather than failing the whole listing.
    pub fn list(conn: &Connection) -> Result<Vec<LockRecord>> {
        let mut stmt = conn.prepare(
            "SELECT subject_id, id, locked_at_ms, duration_hours, reason, locked_by, admin_id, expires_at_ms
             FROM locks ORDER BY expires_at_ms",
        )?;

        let records = stmt
            .query_map([], Self::map_row)?
            .filter_map(|row| match row {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping undecodable lock row: {}", e);
                    None
                }
            })
            .collect();

        Ok(records)
    }

    /// Count stored records.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM locks", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LockRecord> {
        let locked_by: String = row.get(5)?;

        Ok(LockRecord {
            subject_id: row.get(0)?,
            id: row.get(1)?,
            locked_at_ms: row.get(2)?,
            duration_hours: row.get(3)?,
            reason: row.get(4)?,
            // An unrecognized origin string reads as AI rather than
            // invalidating the whole record.
            locked_by: LockedBy::parse(&locked_by).unwrap_or(LockedBy::Ai),
            admin_id: row.get(6)?,
            expires_at_ms: row.get(7)?,
        })
    }
}
