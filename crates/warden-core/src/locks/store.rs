//! Lock store: the single owner of lock record lifecycle.
//!
//! Records are created here, read on every message attempt, and removed by
//! explicit unlock, lazy expiry, or the background sweep. All mutations
//! for one subject serialize on a per-subject mutex, so a
//! violation-triggered lock cannot race a concurrent administrative
//! unlock. There is deliberately no process-wide lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::record::{LockInfo, LockRecord, LockedBy};
use super::repository::{LockRepository, Result};
use crate::events::ModerationNotifier;

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Keyed table of active restrictions with expiry semantics.
///
/// Cheap to clone; clones share the repository, notifier, and per-subject
/// locks.
pub struct LockStore<R: LockRepository> {
    inner: Arc<StoreInner<R>>,
}

impl<R: LockRepository> Clone for LockStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct StoreInner<R> {
    repo: R,
    notifier: Arc<dyn ModerationNotifier>,
    notify_enabled: AtomicBool,
    subject_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: LockRepository> LockStore<R> {
    /// Creates a store over the given repository.
    pub fn new(repo: R, notifier: Arc<dyn ModerationNotifier>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                repo,
                notifier,
                notify_enabled: AtomicBool::new(true),
                subject_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates and persists a lock, replacing any existing record for the
    /// subject. Administrative overrides therefore take precedence over
    /// whatever was there before.
    pub fn lock(
        &self,
        subject_id: &str,
        duration_hours: f64,
        reason: &str,
        locked_by: LockedBy,
        admin_id: Option<&str>,
    ) -> Result<LockRecord> {
        let guard = self.subject_guard(subject_id);
        let _held = guard.lock().unwrap();

        let record = LockRecord::new(
            subject_id,
            duration_hours,
            reason,
            locked_by,
            admin_id.map(str::to_string),
        );
        self.inner.repo.put(&record)?;
        info!(
            "locked subject {} for {}h by {} ({})",
            subject_id, duration_hours, locked_by, reason
        );
        self.notify_locked(&record);
        Ok(record)
    }

    /// Removes a lock if present. Returns false when none existed, which
    /// is a distinguishable no-op rather than an error.
    pub fn unlock(&self, subject_id: &str, reason: &str) -> Result<bool> {
        let guard = self.subject_guard(subject_id);
        let _held = guard.lock().unwrap();

        if self.inner.repo.get(subject_id)?.is_none() {
            return Ok(false);
        }
        self.inner.repo.delete(subject_id)?;
        info!("unlocked subject {} ({})", subject_id, reason);
        self.notify_unlocked(subject_id);
        Ok(true)
    }

    /// True iff the subject holds an unexpired lock.
    ///
    /// An expired record is removed here as a side effect (lazy unlock),
    /// so callers never observe a stale "locked" state.
    pub fn is_locked(&self, subject_id: &str) -> Result<bool> {
        Ok(self.active_record(subject_id)?.is_some())
    }

    /// The subject's record annotated with remaining time, or None.
    /// Applies the same lazy expiry as [`LockStore::is_locked`].
    pub fn info(&self, subject_id: &str) -> Result<Option<LockInfo>> {
        let now_ms = Utc::now().timestamp_millis();
        Ok(self.active_record(subject_id)?.map(|record| LockInfo {
            remaining_ms: record.remaining_ms_at(now_ms),
            record,
        }))
    }

    /// Unlocks every expired record. Returns how many were removed.
    pub fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        for record in self.inner.repo.list()? {
            if record.is_expired() && self.expire_if_stale(&record.subject_id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("sweep removed {} expired locks", removed);
        }
        self.prune_subject_locks();
        Ok(removed)
    }

    /// Spawns a background task sweeping on the given interval.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        R: 'static,
    {
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = store.sweep() {
                    warn!("lock sweep failed: {}", e);
                }
            }
        })
    }

    /// Controls whether lock/unlock events reach the notifier. The
    /// pipeline syncs this from the published configuration snapshot.
    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.inner.notify_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Fetches the subject's record, lazily expiring it when stale.
    fn active_record(&self, subject_id: &str) -> Result<Option<LockRecord>> {
        let guard = self.subject_guard(subject_id);
        let _held = guard.lock().unwrap();

        match self.inner.repo.get(subject_id)? {
            None => Ok(None),
            Some(record) if record.is_expired() => {
                self.inner.repo.delete(subject_id)?;
                debug!("lazily expired lock for subject {}", subject_id);
                self.notify_unlocked(subject_id);
                Ok(None)
            }
            Some(record) => Ok(Some(record)),
        }
    }

    /// Re-checks and removes an expired record under the subject guard.
    /// The record may have been replaced or removed since the sweep
    /// listed it.
    fn expire_if_stale(&self, subject_id: &str) -> Result<bool> {
        let guard = self.subject_guard(subject_id);
        let _held = guard.lock().unwrap();

        match self.inner.repo.get(subject_id)? {
            Some(record) if record.is_expired() => {
                self.inner.repo.delete(subject_id)?;
                self.notify_unlocked(subject_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn subject_guard(&self, subject_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.subject_locks.lock().unwrap();
        map.entry(subject_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops per-subject mutexes nobody is holding, so the table does not
    /// grow without bound across many distinct subjects.
    fn prune_subject_locks(&self) {
        let mut map = self.inner.subject_locks.lock().unwrap();
        map.retain(|_, guard| Arc::strong_count(guard) > 1);
    }

    fn notify_locked(&self, record: &LockRecord) {
        if self.inner.notify_enabled.load(Ordering::Relaxed) {
            self.inner.notifier.on_locked(&record.subject_id, record);
        }
    }

    fn notify_unlocked(&self, subject_id: &str) {
        if self.inner.notify_enabled.load(Ordering::Relaxed) {
            self.inner.notifier.on_unlocked(subject_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::{LockRepository, MemoryLockRepository};
    use std::sync::atomic::AtomicUsize;

    /// Notifier that counts emissions.
    #[derive(Default)]
    struct CountingNotifier {
        locked: AtomicUsize,
        unlocked: AtomicUsize,
    }

    impl ModerationNotifier for CountingNotifier {
        fn on_locked(&self, _subject_id: &str, _record: &LockRecord) {
            self.locked.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unlocked(&self, _subject_id: &str) {
            self.unlocked.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn store() -> (LockStore<MemoryLockRepository>, MemoryLockRepository, Arc<CountingNotifier>) {
        let repo = MemoryLockRepository::new();
        let notifier = Arc::new(CountingNotifier::default());
        let store = LockStore::new(repo.clone(), notifier.clone());
        (store, repo, notifier)
    }

    /// Plants an already-expired record directly in the repository.
    fn plant_expired(repo: &MemoryLockRepository, subject_id: &str) {
        let mut record = LockRecord::new(subject_id, 2.0, "old", LockedBy::Ai, None);
        record.locked_at_ms -= 3 * 3_600_000;
        record.expires_at_ms -= 3 * 3_600_000;
        repo.put(&record).unwrap();
    }

    // ==================== Lock / Unlock Tests ====================

    #[test]
    fn lock_then_is_locked() {
        let (store, _, notifier) = store();

        let record = store
            .lock("alice", 2.0, "flagged", LockedBy::Ai, None)
            .unwrap();
        assert_eq!(record.subject_id, "alice");
        assert!(store.is_locked("alice").unwrap());
        assert_eq!(notifier.locked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unlock_removes_and_reports() {
        let (store, _, notifier) = store();
        store.lock("alice", 2.0, "flagged", LockedBy::Ai, None).unwrap();

        assert!(store.unlock("alice", "appeal accepted").unwrap());
        assert!(!store.is_locked("alice").unwrap());
        assert_eq!(notifier.unlocked.load(Ordering::SeqCst), 1);

        // Second unlock is a no-op, not an error.
        assert!(!store.unlock("alice", "again").unwrap());
        assert_eq!(notifier.unlocked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn admin_lock_overwrites_ai_lock() {
        let (store, _, _) = store();
        store.lock("bob", 48.0, "flagged", LockedBy::Ai, None).unwrap();
        store
            .lock("bob", 168.0, "manual review", LockedBy::Admin, Some("mod_1"))
            .unwrap();

        let info = store.info("bob").unwrap().unwrap();
        assert_eq!(info.record.locked_by, LockedBy::Admin);
        assert_eq!(info.record.admin_id.as_deref(), Some("mod_1"));
        assert_eq!(info.record.duration_hours, 168.0);
    }

    // ==================== Expiry Tests ====================

    #[test]
    fn expired_record_is_lazily_unlocked_exactly_once() {
        let (store, repo, notifier) = store();
        plant_expired(&repo, "alice");

        // First check performs the expiry transition.
        assert!(!store.is_locked("alice").unwrap());
        assert!(store.info("alice").unwrap().is_none());
        assert!(repo.get("alice").unwrap().is_none());

        // Repeated checks do not emit further unlocks.
        assert!(!store.is_locked("alice").unwrap());
        assert_eq!(notifier.unlocked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn negative_duration_expires_immediately() {
        let (store, _, _) = store();
        store.lock("alice", -1.0, "oops", LockedBy::Ai, None).unwrap();
        assert!(!store.is_locked("alice").unwrap());
    }

    #[test]
    fn info_reports_remaining_time() {
        let (store, _, _) = store();
        store.lock("alice", 2.0, "flagged", LockedBy::Ai, None).unwrap();

        let info = store.info("alice").unwrap().unwrap();
        assert!(info.remaining_ms > 0);
        assert!(info.remaining_ms <= 2 * 3_600_000);
    }

    // ==================== Sweep Tests ====================

    #[test]
    fn sweep_removes_only_expired_records() {
        let (store, repo, notifier) = store();
        plant_expired(&repo, "old_1");
        plant_expired(&repo, "old_2");
        store.lock("fresh", 2.0, "flagged", LockedBy::Ai, None).unwrap();

        assert_eq!(store.sweep().unwrap(), 2);
        assert!(store.is_locked("fresh").unwrap());
        assert_eq!(notifier.unlocked.load(Ordering::SeqCst), 2);

        // Nothing left to remove.
        assert_eq!(store.sweep().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_interval() {
        let (store, repo, _) = store();
        plant_expired(&repo, "alice");

        let handle = store.spawn_sweeper(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(repo.get("alice").unwrap().is_none());
        handle.abort();
    }

    // ==================== Notification Gating Tests ====================

    #[test]
    fn disabled_notifications_are_suppressed() {
        let (store, _, notifier) = store();
        store.set_notifications_enabled(false);

        store.lock("alice", 2.0, "flagged", LockedBy::Ai, None).unwrap();
        store.unlock("alice", "appeal").unwrap();

        assert_eq!(notifier.locked.load(Ordering::SeqCst), 0);
        assert_eq!(notifier.unlocked.load(Ordering::SeqCst), 0);

        store.set_notifications_enabled(true);
        store.lock("alice", 2.0, "flagged", LockedBy::Ai, None).unwrap();
        assert_eq!(notifier.locked.load(Ordering::SeqCst), 1);
    }

    // ==================== Failure Tests ====================

    /// Repository whose writes always fail.
    #[derive(Clone, Default)]
    struct FailingRepository {
        inner: MemoryLockRepository,
    }

    impl LockRepository for FailingRepository {
        fn get(&self, subject_id: &str) -> super::Result<Option<LockRecord>> {
            self.inner.get(subject_id)
        }

        fn put(&self, _record: &LockRecord) -> super::Result<()> {
            Err(crate::locks::StoreError::Backend("disk full".to_string()))
        }

        fn delete(&self, subject_id: &str) -> super::Result<bool> {
            self.inner.delete(subject_id)
        }

        fn list(&self) -> super::Result<Vec<LockRecord>> {
            self.inner.list()
        }
    }

    #[test]
    fn failed_write_surfaces_and_leaves_no_partial_state() {
        let repo = FailingRepository::default();
        let notifier = Arc::new(CountingNotifier::default());
        let store = LockStore::new(repo.clone(), notifier.clone());

        assert!(store.lock("alice", 2.0, "flagged", LockedBy::Ai, None).is_err());
        assert!(!store.is_locked("alice").unwrap());
        // No lock event for a write that never landed.
        assert_eq!(notifier.locked.load(Ordering::SeqCst), 0);
    }
}
