//! Account locks: records, the persistence port, and the lock store.

mod record;
mod repository;
mod store;

pub use record::{LockInfo, LockRecord, LockedBy};
pub use repository::{LockRepository, MemoryLockRepository, StoreError};
pub use store::{LockStore, DEFAULT_SWEEP_INTERVAL};
