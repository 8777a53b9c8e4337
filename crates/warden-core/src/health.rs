//! Health controller: error accounting and degradation control.
//!
//! Every component reports failures here. The controller keeps a bounded
//! error log, computes a rolling error rate, and derives a degradation
//! level that it pushes back into the classifier configuration as a fresh
//! snapshot. It never blocks the pipeline, never touches locks, and none
//! of its operations can fail.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classifier::{ClassifierConfig, ConfigHandle};

/// Maximum retained error events.
const MAX_EVENTS: usize = 512;

/// Per-(kind, context) logging allowance within the rolling window.
const MAX_EVENTS_PER_KEY: usize = 5;

/// Rolling window for per-key log rate limiting, in seconds.
const KEY_WINDOW_SECS: i64 = 60;

/// Trailing window the error rate is computed over, in hours.
const RATE_WINDOW_HOURS: i64 = 24;

/// Events per hour that count as a 100% error rate.
const FULL_SCALE_EVENTS_PER_HOUR: f64 = 20.0;

/// How long a service-down report pins the level at Severe, in seconds.
const SERVICE_DOWN_HOLD_SECS: i64 = 5 * 60;

/// Error taxonomy for health accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Endpoint rate-limit signal. Expected under load; triggers the
    /// classifier cooldown rather than a failure path.
    RateLimit,
    /// Retryable network failure.
    TransientNetwork,
    /// Endpoint answered with an unusable payload.
    InvalidResponse,
    /// Lock storage read or write failed.
    Storage,
    /// Sustained endpoint failure; forces degradation level 3.
    ServiceDown,
}

impl ErrorKind {
    /// Returns the kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::TransientNetwork => "transient_network",
            Self::InvalidResponse => "invalid_response",
            Self::Storage => "storage",
            Self::ServiceDown => "service_down",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// When the failure happened.
    pub timestamp: DateTime<Utc>,
    /// Failure classification.
    pub kind: ErrorKind,
    /// Where it happened (component or operation name).
    pub context: String,
    /// Free-form detail.
    pub message: String,
}

/// Degradation levels, least to most degraded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Full functionality.
    #[default]
    Normal,
    /// Minor degradation: retry ceiling reduced, cooldown lengthened.
    Minor,
    /// Moderate degradation: single attempt, notifications disabled.
    Moderate,
    /// Severe degradation: classification force-disabled, fail open.
    Severe,
}

impl DegradationLevel {
    /// Maps an error-rate percentage onto a level.
    fn from_rate(rate_percent: f64) -> Self {
        if rate_percent >= 50.0 {
            Self::Severe
        } else if rate_percent >= 25.0 {
            Self::Moderate
        } else if rate_percent >= 10.0 {
            Self::Minor
        } else {
            Self::Normal
        }
    }

    /// Returns a human-readable name for this level.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
        }
    }

    /// Numeric level (0-3).
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Minor => 1,
            Self::Moderate => 2,
            Self::Severe => 3,
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Default)]
struct HealthState {
    events: VecDeque<ErrorEvent>,
    per_key: HashMap<(ErrorKind, String), VecDeque<DateTime<Utc>>>,
    level: DegradationLevel,
    severe_until: Option<DateTime<Utc>>,
}

/// Aggregates error events and publishes degradation-adjusted
/// configuration snapshots.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HealthController {
    inner: Arc<Mutex<HealthState>>,
    base: Arc<ClassifierConfig>,
    config: ConfigHandle,
}

impl HealthController {
    /// Creates a controller that derives published snapshots from `base`.
    pub fn new(base: ClassifierConfig) -> Self {
        let config = ConfigHandle::new(base.clone());
        Self {
            inner: Arc::new(Mutex::new(HealthState::default())),
            base: Arc::new(base),
            config,
        }
    }

    /// The shared handle the classifier client and pipeline read snapshots
    /// from.
    pub fn config_handle(&self) -> ConfigHandle {
        self.config.clone()
    }

    /// Records one error event. Never fails and never blocks on I/O.
    pub fn record(&self, kind: ErrorKind, context: &str, message: &str) {
        self.record_at(kind, context, message, Utc::now());
    }

    /// Current degradation level, re-evaluated against the live error
    /// history on every read.
    pub fn level(&self) -> DegradationLevel {
        let mut state = self.inner.lock().unwrap();
        self.refresh_level(&mut state, Utc::now());
        state.level
    }

    /// Hourly-normalized error rate over the trailing 24-hour window, as a
    /// percentage of the full-scale rate.
    pub fn error_rate_percent(&self) -> f64 {
        let state = self.inner.lock().unwrap();
        error_rate_percent(&state.events, Utc::now())
    }

    /// Snapshot of retained error events, oldest first.
    pub fn events(&self) -> Vec<ErrorEvent> {
        self.inner.lock().unwrap().events.iter().cloned().collect()
    }

    fn record_at(&self, kind: ErrorKind, context: &str, message: &str, now: DateTime<Utc>) {
        let mut state = self.inner.lock().unwrap();

        // Per-key rate limit: a failure storm must not flood the log.
        {
            let window = state
                .per_key
                .entry((kind, context.to_string()))
                .or_default();
            while let Some(front) = window.front() {
                if (now - *front).num_seconds() >= KEY_WINDOW_SECS {
                    window.pop_front();
                } else {
                    break;
                }
            }
            if window.len() >= MAX_EVENTS_PER_KEY {
                return;
            }
            window.push_back(now);
        }

        state.events.push_back(ErrorEvent {
            timestamp: now,
            kind,
            context: context.to_string(),
            message: message.to_string(),
        });
        while state.events.len() > MAX_EVENTS {
            state.events.pop_front();
        }

        if kind == ErrorKind::ServiceDown {
            state.severe_until = Some(now + ChronoDuration::seconds(SERVICE_DOWN_HOLD_SECS));
        }

        self.refresh_level(&mut state, now);
    }

    /// Re-derives the level and publishes a new snapshot on change.
    fn refresh_level(&self, state: &mut HealthState, now: DateTime<Utc>) {
        if let Some(until) = state.severe_until {
            if now < until {
                self.transition(state, DegradationLevel::Severe);
                return;
            }
            // Recovery window over; re-measure from the live rate so
            // classification gets re-enabled for probing.
            state.severe_until = None;
        }

        let rate = error_rate_percent(&state.events, now);
        self.transition(state, DegradationLevel::from_rate(rate));
    }

    fn transition(&self, state: &mut HealthState, level: DegradationLevel) {
        if state.level == level {
            return;
        }
        warn!(
            "degradation level changed: {} -> {}",
            state.level.name(),
            level.name()
        );
        state.level = level;
        self.config.publish(derive_config(&self.base, level));
    }
}

/// Computes the hourly-normalized error rate over the trailing window.
fn error_rate_percent(events: &VecDeque<ErrorEvent>, now: DateTime<Utc>) -> f64 {
    let cutoff = now - ChronoDuration::hours(RATE_WINDOW_HOURS);
    let recent = events.iter().filter(|e| e.timestamp > cutoff).count();
    let per_hour = recent as f64 / RATE_WINDOW_HOURS as f64;
    (per_hour / FULL_SCALE_EVENTS_PER_HOUR * 100.0).min(100.0)
}

/// Derives the published configuration for a degradation level.
fn derive_config(base: &ClassifierConfig, level: DegradationLevel) -> ClassifierConfig {
    let mut config = base.clone();
    match level {
        DegradationLevel::Normal => {}
        DegradationLevel::Minor => {
            config.max_retry_attempts = base.max_retry_attempts.min(2);
            config.cooldown = base.cooldown.mul_f32(1.5);
        }
        DegradationLevel::Moderate => {
            config.max_retry_attempts = 1;
            config.cooldown = base.cooldown.mul_f32(1.5);
            config.request_timeout = base.request_timeout.mul_f32(0.75);
            config.notifications_enabled = false;
        }
        DegradationLevel::Severe => {
            config.max_retry_attempts = 1;
            config.cooldown = base.cooldown.mul_f32(2.0);
            config.request_timeout = base.request_timeout.mul_f32(0.75);
            config.notifications_enabled = false;
            config.classification_enabled = false;
        }
    }
    config
}
