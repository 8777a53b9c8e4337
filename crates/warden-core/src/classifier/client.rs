//! Rate-limited classifier client.
//!
//! Wraps the external classification endpoint with the behavior the
//! pipeline relies on:
//!
//! - Exponential backoff on transient network errors
//! - A rate-limit state machine: after an endpoint rate-limit signal the
//!   client stops issuing calls, parks new work in a FIFO queue, and a
//!   single drain task services the queue in strict arrival order once a
//!   cooldown elapses
//! - Fail-open handling of malformed responses
//!
//! Configuration is read once per call as an immutable snapshot, so a
//! degradation change published mid-call never affects an in-flight retry
//! loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use super::config::{ClassifierConfig, ConfigHandle};
use super::transport::{ClassifyRequest, ClassifyTransport, TransportError};
use super::verdict::Verdict;
use crate::health::{ErrorKind, HealthController};

/// Maximum message length forwarded to the endpoint, in characters.
pub const MAX_TEXT_CHARS: usize = 2000;

/// Classifier client errors.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The attempt ceiling was exhausted without a usable response.
    #[error("classification failed after {attempts} attempts")]
    RetriesExhausted {
        /// How many transport attempts were made.
        attempts: u32,
    },

    /// A queued call was dropped before the drain reached it.
    #[error("queued classification was abandoned")]
    Abandoned,
}

/// Result type for classifier operations.
pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Client state machine. `RateLimited` holds until the queue fully drains,
/// so late arrivals cannot jump ahead of parked work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientMode {
    Normal,
    RateLimited,
}

/// A call parked while the client is rate limited.
struct QueuedCall {
    request: ClassifyRequest,
    attempt: u32,
    tx: oneshot::Sender<Result<Verdict>>,
}

struct QueueState {
    mode: ClientMode,
    queue: VecDeque<QueuedCall>,
    draining: bool,
}

/// Outcome of the attempt loop for one call.
enum AttemptOutcome {
    Done(Result<Verdict>),
    /// The endpoint rate-limited this attempt; the caller decides whether
    /// to park the call or give up.
    RateLimitHit { attempt: u32 },
}

/// Rate-limited client for the external classification endpoint.
///
/// Cheap to clone; clones share the queue and state machine.
#[derive(Clone)]
pub struct ClassifierClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn ClassifyTransport>,
    config: ConfigHandle,
    health: HealthController,
    state: Mutex<QueueState>,
}

impl ClassifierClient {
    /// Creates a client over the given transport.
    pub fn new(
        transport: Arc<dyn ClassifyTransport>,
        config: ConfigHandle,
        health: HealthController,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                config,
                health,
                state: Mutex::new(QueueState {
                    mode: ClientMode::Normal,
                    queue: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }

    /// Classifies one message.
    ///
    /// Input that is empty after sanitization resolves to a clean verdict
    /// without a network call. While the client is rate limited the call
    /// parks in a FIFO queue and resumes once the cooldown drain reaches
    /// it.
    pub async fn classify(&self, text: &str, subject_id: &str, context: &str) -> Result<Verdict> {
        let cfg = self.inner.config.snapshot();

        let sanitized = sanitize_text(text);
        if sanitized.is_empty() {
            return Ok(Verdict::clean());
        }

        let request = ClassifyRequest {
            text: sanitized,
            subject_id: subject_id.to_string(),
            context: context.to_string(),
        };

        // Park immediately if a cooldown is already in progress.
        let parked = {
            let mut state = self.inner.state.lock().await;
            if state.mode == ClientMode::RateLimited {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(QueuedCall {
                    request: request.clone(),
                    attempt: 1,
                    tx,
                });
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = parked {
            return await_parked(rx).await;
        }

        match self.run_attempts(&request, 1, &cfg).await {
            AttemptOutcome::Done(result) => result,
            AttemptOutcome::RateLimitHit { attempt } => {
                let rx = {
                    let mut state = self.inner.state.lock().await;
                    state.mode = ClientMode::RateLimited;
                    if attempt >= cfg.max_retry_attempts {
                        // No attempts left, but the drain must still run so
                        // the client eventually returns to Normal.
                        self.spawn_drain(&mut state);
                        return Err(ClassifierError::RetriesExhausted { attempts: attempt });
                    }
                    let (tx, rx) = oneshot::channel();
                    state.queue.push_back(QueuedCall {
                        request,
                        attempt: attempt + 1,
                        tx,
                    });
                    self.spawn_drain(&mut state);
                    rx
                };
                await_parked(rx).await
            }
        }
    }

    /// Returns true while the rate-limit cooldown/drain is in progress.
    pub async fn is_rate_limited(&self) -> bool {
        self.inner.state.lock().await.mode == ClientMode::RateLimited
    }

    /// Number of calls currently parked in the queue.
    pub async fn queued_calls(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// Runs the transport attempt loop for one call.
    ///
    /// Transient errors back off exponentially (`2^attempt * 1000ms`) and
    /// retry in place; a rate-limit signal is returned to the caller, which
    /// owns the queueing decision.
    async fn run_attempts(
        &self,
        request: &ClassifyRequest,
        start_attempt: u32,
        cfg: &ClassifierConfig,
    ) -> AttemptOutcome {
        let mut attempt = start_attempt;
        loop {
            match self
                .inner
                .transport
                .send(request.clone(), cfg.request_timeout)
                .await
            {
                Ok(body) => {
                    let verdict = match Verdict::from_wire(body) {
                        Some(verdict) => verdict,
                        None => {
                            self.inner.health.record(
                                ErrorKind::InvalidResponse,
                                "classifier",
                                "malformed endpoint response",
                            );
                            Verdict::invalid_response()
                        }
                    };
                    return AttemptOutcome::Done(Ok(verdict));
                }
                Err(TransportError::RateLimited) => {
                    self.inner.health.record(
                        ErrorKind::RateLimit,
                        "classifier",
                        "endpoint rate limit signal",
                    );
                    return AttemptOutcome::RateLimitHit { attempt };
                }
                Err(TransportError::Transient(message)) => {
                    self.inner
                        .health
                        .record(ErrorKind::TransientNetwork, "classifier", &message);
                    if attempt >= cfg.max_retry_attempts {
                        warn!(
                            "classification gave up after {} attempts: {}",
                            attempt, message
                        );
                        return AttemptOutcome::Done(Err(ClassifierError::RetriesExhausted {
                            attempts: attempt,
                        }));
                    }
                    let delay = backoff_delay(attempt);
                    debug!(
                        "transient classifier error on attempt {}: {}; retrying in {:?}",
                        attempt, message, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(TransportError::Invalid(message)) => {
                    self.inner
                        .health
                        .record(ErrorKind::InvalidResponse, "classifier", &message);
                    return AttemptOutcome::Done(Ok(Verdict::invalid_response()));
                }
            }
        }
    }

    /// Starts the drain task unless one is already running. Idempotent;
    /// must be called with the state lock held.
    fn spawn_drain(&self, state: &mut QueueState) {
        if state.draining {
            return;
        }
        state.draining = true;
        let client = self.clone();
        tokio::spawn(async move {
            client.drain_queue().await;
        });
    }

    /// Services parked calls in arrival order after each cooldown.
    ///
    /// Exactly one drain task exists at a time. The client returns to
    /// `Normal` only once the queue is empty.
    async fn drain_queue(self) {
        loop {
            let cooldown = self.inner.config.snapshot().cooldown;
            debug!("rate limited; cooling down for {:?}", cooldown);
            tokio::time::sleep(cooldown).await;

            loop {
                let next = self.inner.state.lock().await.queue.pop_front();
                let Some(call) = next else {
                    let mut state = self.inner.state.lock().await;
                    // A call may have parked between the pop and this lock.
                    if state.queue.is_empty() {
                        state.mode = ClientMode::Normal;
                        state.draining = false;
                        debug!("cooldown drain complete; resuming normal service");
                        return;
                    }
                    continue;
                };

                let cfg = self.inner.config.snapshot();
                match self.run_attempts(&call.request, call.attempt, &cfg).await {
                    AttemptOutcome::Done(result) => {
                        // The caller may have gone away; nothing to do then.
                        let _ = call.tx.send(result);
                    }
                    AttemptOutcome::RateLimitHit { attempt } => {
                        let mut state = self.inner.state.lock().await;
                        state.mode = ClientMode::RateLimited;
                        if attempt >= cfg.max_retry_attempts {
                            drop(state);
                            let _ = call.tx.send(Err(ClassifierError::RetriesExhausted {
                                attempts: attempt,
                            }));
                        } else {
                            // Oldest work goes back to the front so arrival
                            // order is preserved.
                            state.queue.push_front(QueuedCall {
                                request: call.request,
                                attempt: attempt + 1,
                                tx: call.tx,
                            });
                        }
                        break;
                    }
                }

                tokio::time::sleep(self.inner.config.snapshot().drain_gap).await;
            }
        }
    }
}

async fn await_parked(rx: oneshot::Receiver<Result<Verdict>>) -> Result<Verdict> {
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(ClassifierError::Abandoned),
    }
}

/// Caps the text at [`MAX_TEXT_CHARS`] characters, strips control
/// characters, and trims surrounding whitespace.
fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control())
        .take(MAX_TEXT_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Exponential backoff: `2^attempt * 1000ms`, capped at 2^10.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(1000u64.saturating_mul(1u64 << attempt.min(10)))
}
