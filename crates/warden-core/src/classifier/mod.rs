//! Classifier client for the external content-classification endpoint.
//!
//! This module owns everything between the pipeline and the wire: request
//! sanitization, the transport seam, verdict parsing, retry/backoff, and
//! the rate-limit queue.

mod client;
mod config;
mod transport;
mod verdict;

pub use client::{ClassifierClient, ClassifierError, MAX_TEXT_CHARS};
pub use config::{ClassifierConfig, ConfigHandle};
pub use transport::{BoxFuture, ClassifyRequest, ClassifyTransport, HttpTransport, TransportError};
pub use verdict::{Verdict, ViolationType};
