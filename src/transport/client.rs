//! The `Transport` seam and the bound `TransportClient`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::core::{Error, FailureCategory, Result};

use super::TransportBinding;

/// Raw HTTP outcome before status classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// A 200 response with `body`.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }
}

/// Asynchronous request/response transport.
///
/// Implementations POST `body` to `binding.url()` under the binding's TLS
/// policy and return the status and body. Connection-level failures must
/// already be classified as [`Error::Transport`]; status codes are left to
/// [`classify_status`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request.
    async fn post(
        &self,
        binding: &TransportBinding,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<TransportResponse>;
}

/// Map an HTTP status to the failure taxonomy.
pub fn classify_status(status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        403 => Err(Error::AuthenticationFailure),
        503 => Err(Error::DeviceBusy),
        status => Err(Error::RequestFailure { status }),
    }
}

/// A transport bound to one [`TransportBinding`] and request timeout.
///
/// Cloning shares the binding; it is never rebuilt.
#[derive(Clone)]
pub struct TransportClient {
    transport: Arc<dyn Transport>,
    binding: Arc<TransportBinding>,
    timeout: Duration,
}

impl TransportClient {
    /// Bind `transport` to `binding`.
    pub fn new(transport: Arc<dyn Transport>, binding: TransportBinding, timeout: Duration) -> Self {
        Self {
            transport,
            binding: Arc::new(binding),
            timeout,
        }
    }

    /// The shared binding.
    pub fn binding(&self) -> &Arc<TransportBinding> {
        &self.binding
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Same binding, different timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            binding: Arc::clone(&self.binding),
            timeout,
        }
    }

    /// Send one request and return the body of a 2xx response.
    ///
    /// The whole exchange is bounded by the client timeout; expiry surfaces
    /// as a `Timeout` transport failure.
    pub async fn send(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        trace!(url = %self.binding.url(), bytes = body.len(), "post");
        let response = tokio::time::timeout(
            self.timeout,
            self.transport.post(&self.binding, body, self.timeout),
        )
        .await
        .map_err(|_| Error::Transport(FailureCategory::Timeout))??;

        if let Err(err) = classify_status(response.status) {
            warn!(url = %self.binding.url(), status = response.status, "request rejected");
            return Err(err);
        }
        Ok(response.body)
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("binding", &self.binding)
            .field("timeout", &self.timeout)
            .finish()
    }
}
