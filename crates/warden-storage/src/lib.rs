//! Warden Storage - SQLite persistence for lock records.
//!
//! This crate implements the `warden_core::locks::LockRepository` port on
//! top of rusqlite:
//!
//! - `locks` table keyed by subject id (one active record per subject)
//! - Versioned schema migrations
//! - Corruption recovery: an unreadable database file is moved aside and
//!   replaced with a fresh store instead of failing startup
//!
//! # Example
//!
//! ```
//! use warden_core::locks::{LockRecord, LockRepository, LockedBy};
//! use warden_storage::Database;
//!
//! let db = Database::in_memory().unwrap();
//!
//! let record = LockRecord::new("alice", 48.0, "explicit content", LockedBy::Ai, None);
//! db.put(&record).unwrap();
//! assert!(db.get("alice").unwrap().is_some());
//! ```

mod database;
pub mod error;
mod pool;
mod repository;
mod schema;

pub use database::Database;
pub use error::{Result, StorageError};
pub use pool::ConnectionPool;
pub use repository::LocksRepo;
