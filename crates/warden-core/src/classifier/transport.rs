//! Transport layer for the classification endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Boxed future returned by transport implementations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One classification request as sent over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyRequest {
    /// Sanitized message text.
    pub text: String,
    /// Subject the message belongs to.
    pub subject_id: String,
    /// Free-form context for the endpoint (channel, conversation kind).
    pub context: String,
}

/// Errors surfaced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint signalled rate limiting (HTTP 429).
    #[error("endpoint rate limited the request")]
    RateLimited,

    /// Connection failure, timeout, or server-side error. Retryable.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The endpoint answered but the response is unusable. Not retryable.
    #[error("invalid response: {0}")]
    Invalid(String),
}

/// Sends classification requests to the external endpoint.
///
/// The production implementation is [`HttpTransport`]; tests substitute
/// scripted transports. Implementations map their failure modes onto
/// [`TransportError`] so the client's retry logic stays transport-agnostic.
pub trait ClassifyTransport: Send + Sync {
    /// Sends one request and returns the raw response body.
    fn send(
        &self,
        request: ClassifyRequest,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Value, TransportError>>;
}

/// HTTP transport backed by reqwest.
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a transport posting to the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ClassifyTransport for HttpTransport {
    fn send(
        &self,
        request: ClassifyRequest,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Value, TransportError>> {
        Box::pin(async move {
            let response = self
                .http
                .post(&self.endpoint)
                .timeout(timeout)
                .json(&request)
                .send()
                .await
                .map_err(|e| TransportError::Transient(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(TransportError::RateLimited);
            }
            if status.is_server_error() {
                return Err(TransportError::Transient(format!("HTTP error: {}", status)));
            }
            if !status.is_success() {
                return Err(TransportError::Invalid(format!("HTTP error: {}", status)));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| TransportError::Invalid(e.to_string()))
        })
    }
}
