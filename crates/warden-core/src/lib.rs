//! Warden Core - chat message moderation pipeline.
//!
//! This crate provides the moderation logic for the Warden platform. It
//! screens outbound chat messages through an external classification
//! endpoint, converts verdicts into timed account locks, and enforces
//! those locks on later message attempts:
//!
//! - Classifier client with rate-limit queueing and retry/backoff
//! - Pure policy mapping from verdicts to enforcement decisions
//! - Timed locks with lazy expiry and a background sweep
//! - Error-rate-driven degradation control that fails open
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden_core::locks::MemoryLockRepository;
//! use warden_core::{ClassifierConfig, HttpTransport, ModerationPipeline, NullNotifier};
//!
//! # async fn demo() {
//! let pipeline = ModerationPipeline::new(
//!     Arc::new(HttpTransport::new("https://moderation.example/api/classify")),
//!     MemoryLockRepository::new(),
//!     Arc::new(NullNotifier),
//!     ClassifierConfig::default(),
//! );
//!
//! let decision = pipeline.intercept("hello there", "alice", "dm").await;
//! if !decision.allowed {
//!     // Do not transmit the message.
//! }
//! # }
//! ```

pub mod classifier;
pub mod events;
pub mod health;
pub mod locks;
pub mod pipeline;
pub mod policy;

pub use classifier::{
    ClassifierClient, ClassifierConfig, ClassifierError, ClassifyTransport, ConfigHandle,
    HttpTransport, Verdict, ViolationType,
};
pub use events::{ModerationNotifier, NullNotifier};
pub use health::{DegradationLevel, ErrorEvent, ErrorKind, HealthController};
pub use locks::{
    LockInfo, LockRecord, LockRepository, LockStore, LockedBy, MemoryLockRepository, StoreError,
};
pub use pipeline::ModerationPipeline;
pub use policy::{Decision, PolicyMapper, Severity};
