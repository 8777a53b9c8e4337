//! High-level database interface.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::{info, warn};

use warden_core::locks::{LockRecord, LockRepository, StoreError};

use crate::error::{Result, StorageError};
use crate::pool::ConnectionPool;
use crate::repository::LocksRepo;

/// High-level database interface for Warden.
///
/// Implements [`LockRepository`], so it plugs directly into
/// `warden_core::locks::LockStore`.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Create a new database in the default app data directory.
    pub fn new() -> Result<Self> {
        let path = Self::default_db_path()?;
        Self::with_path(path)
    }

    /// Create a new database at a specific path.
    ///
    /// An unreadable or corrupt database file is moved aside and replaced
    /// with a fresh store; startup never fails on corruption alone.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening lock database at: {:?}", path);
        let pool = Self::open_with_recovery(&path)?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing and ephemeral use).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "warden", "warden")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("warden.db"))
    }

    fn open_with_recovery(path: &Path) -> Result<ConnectionPool> {
        match ConnectionPool::new(path) {
            Ok(pool) => Ok(pool),
            Err(first) => {
                warn!(
                    "Lock database unreadable ({}); starting with an empty store",
                    first
                );
                let quarantine = path.with_extension("corrupt");
                if std::fs::rename(path, &quarantine).is_err() {
                    std::fs::remove_file(path)?;
                }
                ConnectionPool::new(path)
            }
        }
    }

    // === Lock records ===

    /// Get the lock record for a subject.
    pub fn get_lock(&self, subject_id: &str) -> Result<Option<LockRecord>> {
        let conn = self.pool.get()?;
        LocksRepo::get(&conn, subject_id)
    }

    /// Insert or replace a lock record.
    pub fn put_lock(&self, record: &LockRecord) -> Result<()> {
        let conn = self.pool.get()?;
        LocksRepo::upsert(&conn, record)
    }

    /// Delete a subject's lock record. Returns true if one existed.
    pub fn delete_lock(&self, subject_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        LocksRepo::delete(&conn, subject_id)
    }

    /// List all lock records, soonest expiry first.
    pub fn list_locks(&self) -> Result<Vec<LockRecord>> {
        let conn = self.pool.get()?;
        LocksRepo::list(&conn)
    }

    /// Count stored lock records.
    pub fn count_locks(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        LocksRepo::count(&conn)
    }
}

impl LockRepository for Database {
    fn get(&self, subject_id: &str) -> std::result::Result<Option<LockRecord>, StoreError> {
        self.get_lock(subject_id).map_err(into_store_error)
    }

    fn put(&self, record: &LockRecord) -> std::result::Result<(), StoreError> {
        self.put_lock(record).map_err(into_store_error)
    }

    fn delete(&self, subject_id: &str) -> std::result::Result<bool, StoreError> {
        self.delete_lock(subject_id).map_err(into_store_error)
    }

    fn list(&self) -> std::result::Result<Vec<LockRecord>, StoreError> {
        self.list_locks().map_err(into_store_error)
    }
}

fn into_store_error(e: StorageError) -> StoreError {
    StoreError::Backend(e.to_string())
}
