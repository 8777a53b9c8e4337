//! Classifier configuration snapshots.
//!
//! Configuration is read once at call start as an immutable snapshot, and
//! the health controller publishes replacement snapshots atomically. An
//! in-flight retry loop therefore never observes a half-applied change.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunable parameters for the classifier client and pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Attempt ceiling for one classify call. Rate-limit signals and
    /// transient errors both consume attempts.
    pub max_retry_attempts: u32,
    /// Per-request timeout for the endpoint call.
    pub request_timeout: Duration,
    /// How long to wait after a rate-limit signal before draining queued
    /// calls.
    pub cooldown: Duration,
    /// Gap inserted between consecutive drained calls so the drain itself
    /// does not re-trigger the rate limit.
    pub drain_gap: Duration,
    /// Whether classification runs at all. Degradation level 3 turns this
    /// off and the pipeline fails open.
    pub classification_enabled: bool,
    /// Whether lock/unlock notifications are emitted. Degradation level 2
    /// turns these off.
    pub notifications_enabled: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            request_timeout: Duration::from_secs(10),
            cooldown: Duration::from_secs(12),
            drain_gap: Duration::from_millis(250),
            classification_enabled: true,
            notifications_enabled: true,
        }
    }
}

/// Shared handle through which configuration snapshots are published.
///
/// Cheap to clone; all clones observe the same snapshot.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<ClassifierConfig>>>,
}

impl ConfigHandle {
    /// Creates a handle holding the given initial configuration.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Returns the current snapshot. The snapshot stays valid even if a
    /// new configuration is published while it is held.
    pub fn snapshot(&self) -> Arc<ClassifierConfig> {
        self.inner.read().unwrap().clone()
    }

    /// Atomically replaces the published configuration.
    pub fn publish(&self, config: ClassifierConfig) {
        *self.inner.write().unwrap() = Arc::new(config);
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ClassifierConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.cooldown, Duration::from_secs(12));
        assert_eq!(config.drain_gap, Duration::from_millis(250));
        assert!(config.classification_enabled);
        assert!(config.notifications_enabled);
    }

    #[test]
    fn snapshot_reflects_published_config() {
        let handle = ConfigHandle::default();
        assert_eq!(handle.snapshot().max_retry_attempts, 3);

        let mut updated = ClassifierConfig::default();
        updated.max_retry_attempts = 1;
        handle.publish(updated);

        assert_eq!(handle.snapshot().max_retry_attempts, 1);
    }

    #[test]
    fn held_snapshot_survives_publish() {
        let handle = ConfigHandle::default();
        let before = handle.snapshot();

        let mut updated = ClassifierConfig::default();
        updated.classification_enabled = false;
        handle.publish(updated);

        // The old snapshot is immutable; only new reads see the change.
        assert!(before.classification_enabled);
        assert!(!handle.snapshot().classification_enabled);
    }

    #[test]
    fn clones_share_state() {
        let handle = ConfigHandle::default();
        let other = handle.clone();

        let mut updated = ClassifierConfig::default();
        updated.notifications_enabled = false;
        handle.publish(updated);

        assert!(!other.snapshot().notifications_enabled);
    }

    #[test]
    fn config_serialization_round_trip() {
        let config = ClassifierConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ClassifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
