//! Lock persistence port.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use super::record::LockRecord;

/// Errors from a lock repository backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed.
    #[error("lock storage error: {0}")]
    Backend(String),
}

/// Result type for lock store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Narrow persistence port for lock records, keyed by subject id.
///
/// Implementations overwrite on `put` and treat deletion of a missing key
/// as a no-op. `warden-storage` provides the durable SQLite
/// implementation; [`MemoryLockRepository`] backs tests and ephemeral
/// embeddings. Swapping the backend never touches pipeline logic.
pub trait LockRepository: Send + Sync {
    /// Fetches the record for a subject.
    fn get(&self, subject_id: &str) -> Result<Option<LockRecord>>;

    /// Inserts or replaces the record for a subject.
    fn put(&self, record: &LockRecord) -> Result<()>;

    /// Deletes the record for a subject. Returns true if one existed.
    fn delete(&self, subject_id: &str) -> Result<bool>;

    /// Lists all stored records, in no particular order.
    fn list(&self) -> Result<Vec<LockRecord>>;
}

/// In-memory repository backed by a shared HashMap.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockRepository {
    records: Arc<RwLock<HashMap<String, LockRecord>>>,
}

impl MemoryLockRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// True when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

impl LockRepository for MemoryLockRepository {
    fn get(&self, subject_id: &str) -> Result<Option<LockRecord>> {
        Ok(self.records.read().unwrap().get(subject_id).cloned())
    }

    fn put(&self, record: &LockRecord) -> Result<()> {
        self.records
            .write()
            .unwrap()
            .insert(record.subject_id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, subject_id: &str) -> Result<bool> {
        Ok(self.records.write().unwrap().remove(subject_id).is_some())
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }
}
