//! The decision pipeline: one `intercept` call per outbound message.
//!
//! ## Evaluation Order
//!
//! 1. Active lock check - a locked subject is denied immediately
//! 2. Kill switches and pre-filter - skipped messages are allowed
//! 3. Classification - hard failures fail open
//! 4. Policy mapping and enforcement - violations deny and lock
//! 5. Default allow
//!
//! Moderation failures are never allowed to block legitimate traffic: a
//! classifier outage or storage error resolves to `Allow`, and every such
//! failure is reported to the health controller. The one invariant that
//! outranks fail-open is that violating content is never delivered - a
//! deny stands even when the lock write behind it fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::classifier::{
    ClassifierClient, ClassifierConfig, ClassifyTransport, ConfigHandle,
};
use crate::events::ModerationNotifier;
use crate::health::{ErrorKind, HealthController};
use crate::locks::{LockRepository, LockStore, LockedBy};
use crate::policy::{Decision, PolicyMapper};

/// The moderation pipeline: every component, wired once at startup.
///
/// There are no process-wide globals; the surrounding application builds
/// one pipeline and hands clones to whatever tasks need to intercept
/// messages or administer locks. Clones share all state.
pub struct ModerationPipeline<R: LockRepository> {
    client: ClassifierClient,
    store: LockStore<R>,
    mapper: PolicyMapper,
    health: HealthController,
    config: ConfigHandle,
    enabled: Arc<AtomicBool>,
}

impl<R: LockRepository> Clone for ModerationPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            store: self.store.clone(),
            mapper: self.mapper.clone(),
            health: self.health.clone(),
            config: self.config.clone(),
            enabled: self.enabled.clone(),
        }
    }
}

impl<R: LockRepository> ModerationPipeline<R> {
    /// Wires the pipeline from its leaf components.
    pub fn new(
        transport: Arc<dyn ClassifyTransport>,
        repository: R,
        notifier: Arc<dyn ModerationNotifier>,
        config: ClassifierConfig,
    ) -> Self {
        let health = HealthController::new(config);
        let config = health.config_handle();
        let client = ClassifierClient::new(transport, config.clone(), health.clone());
        let store = LockStore::new(repository, notifier);
        Self {
            client,
            store,
            mapper: PolicyMapper::new(),
            health,
            config,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The lock store, for administrative lock/unlock and remaining-time
    /// display.
    pub fn store(&self) -> &LockStore<R> {
        &self.store
    }

    /// The health controller, for diagnostics.
    pub fn health(&self) -> &HealthController {
        &self.health
    }

    /// The classifier client, for diagnostics.
    pub fn client(&self) -> &ClassifierClient {
        &self.client
    }

    /// Administratively enables or disables classification. While
    /// disabled, `intercept` allows everything that is not locked.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether classification is administratively enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Screens one outbound message and returns the allow/deny outcome.
    /// The caller must not transmit the message on a deny.
    pub async fn intercept(&self, text: &str, subject_id: &str, context: &str) -> Decision {
        // Step 1: an active lock denies before any classification.
        match self.store.is_locked(subject_id) {
            Ok(true) => {
                debug!("denied {}: account locked", subject_id);
                let info = self.store.info(subject_id).ok().flatten();
                return Decision::locked(info.map(|i| i.record));
            }
            Ok(false) => {}
            Err(e) => {
                // Fail open: a broken lock store must not block chat.
                self.health
                    .record(ErrorKind::Storage, "lock_check", &e.to_string());
                warn!("lock check failed for {}; failing open: {}", subject_id, e);
            }
        }

        // Step 2: kill switches and the pre-filter.
        let snapshot = self.config.snapshot();
        self.store
            .set_notifications_enabled(snapshot.notifications_enabled);
        if !self.is_enabled()
            || !snapshot.classification_enabled
            || !self.mapper.should_evaluate(text)
        {
            return Decision::allow("skipped");
        }

        // Step 3: classify. Hard failure after retries fails open.
        let verdict = match self.client.classify(text, subject_id, context).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("classification unavailable for {}: {}", subject_id, e);
                return Decision::allow("classification unavailable");
            }
        };

        // Step 4: map the verdict and enforce a deny with a lock.
        let decision = self.mapper.map_verdict(&verdict);
        if decision.is_denied() {
            match self.store.lock(
                subject_id,
                decision.lock_duration_hours,
                &decision.reason,
                LockedBy::Ai,
                None,
            ) {
                Ok(record) => return decision.with_lock(record),
                Err(e) => {
                    // The deny stands: blocking the message matters more
                    // than recording the lock.
                    self.health
                        .record(ErrorKind::Storage, "lock_write", &e.to_string());
                    warn!("failed to persist lock for {}: {}", subject_id, e);
                    return decision;
                }
            }
        }

        // Step 5: approved (or mapped to allow by policy).
        decision
    }
}
