//! Observer hooks for lock lifecycle events.
//!
//! The core never renders anything. The surrounding application implements
//! [`ModerationNotifier`] to surface lock activity in its UI (ban banners,
//! countdown timers, moderator dashboards) and subscribes it at pipeline
//! construction time.

use crate::locks::LockRecord;

/// Receives lock lifecycle events.
///
/// Implementations must be cheap and non-blocking; they run inline with
/// lock store mutations.
pub trait ModerationNotifier: Send + Sync {
    /// A subject was locked. `record` is the newly persisted lock.
    fn on_locked(&self, subject_id: &str, record: &LockRecord);

    /// A subject's lock was removed, whether by explicit unlock or expiry.
    fn on_unlocked(&self, subject_id: &str);
}

/// Notifier that drops every event. Useful for headless embeddings and
/// tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl ModerationNotifier for NullNotifier {
    fn on_locked(&self, _subject_id: &str, _record: &LockRecord) {}

    fn on_unlocked(&self, _subject_id: &str) {}
}
