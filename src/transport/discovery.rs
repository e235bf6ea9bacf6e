//! Scheme and TLS policy discovery for a bare host.
//!
//! Candidates are probed in a fixed, configurable order with one
//! `ModelAndVersionRequest` each. Only failures that a different scheme
//! could fix move on to the next candidate; everything else ends discovery.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::{DEFAULT_PROBE_TIMEOUT, Error, FailureCategory, Result};
use crate::crypto::SharedSecret;
use crate::payload::{PayloadCoder, RpcChannel};
use crate::protocol::{CommandTable, Decoded, ModelAndVersion};

use super::{HostSpec, Scheme, TlsPolicy, Transport, TransportBinding, TransportClient};

const PROBE_COMMAND: &str = "ModelAndVersionRequest";

/// One scheme and TLS policy pair to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeCandidate {
    /// Scheme.
    pub scheme: Scheme,
    /// TLS policy; ignored for plain HTTP.
    pub tls: TlsPolicy,
}

impl ProbeCandidate {
    /// Build a candidate.
    pub const fn new(scheme: Scheme, tls: TlsPolicy) -> Self {
        Self { scheme, tls }
    }

    /// Local binding for this candidate on `host`.
    pub fn bind(&self, host: &str) -> Result<TransportBinding> {
        TransportBinding::local(host, self.scheme, self.tls)
    }
}

impl fmt::Display for ProbeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Https => write!(f, "https ({} tls)", self.tls),
            Scheme::Http => f.write_str("http"),
        }
    }
}

/// A failed probe and why it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeAttempt {
    /// What was tried.
    pub candidate: ProbeCandidate,
    /// How it failed.
    pub category: FailureCategory,
}

impl fmt::Display for ProbeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.candidate, self.category)
    }
}

/// Ordered probe candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOrder(Vec<ProbeCandidate>);

impl ProbeOrder {
    /// Use `candidates` in the given order. An empty order is rejected.
    pub fn new(candidates: Vec<ProbeCandidate>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(Error::Config("probe order is empty".into()));
        }
        Ok(Self(candidates))
    }

    /// Candidates in probe order.
    pub fn candidates(&self) -> &[ProbeCandidate] {
        &self.0
    }
}

impl Default for ProbeOrder {
    fn default() -> Self {
        Self(vec![
            ProbeCandidate::new(Scheme::Https, TlsPolicy::Strict),
            ProbeCandidate::new(Scheme::Https, TlsPolicy::RelaxedLocal),
            ProbeCandidate::new(Scheme::Http, TlsPolicy::Strict),
        ])
    }
}

/// Picks the transport for a host.
#[derive(Clone)]
pub struct Discovery {
    transport: Arc<dyn Transport>,
    order: ProbeOrder,
    probe_timeout: Duration,
}

impl Discovery {
    /// Discovery over `transport` with the default order and probe timeout.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            order: ProbeOrder::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Replace the probe order.
    pub fn with_order(mut self, order: ProbeOrder) -> Self {
        self.order = order;
        self
    }

    /// Replace the per-probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Probe order in force.
    pub fn order(&self) -> &ProbeOrder {
        &self.order
    }

    /// Resolve `host` to a binding.
    pub async fn discover(&self, host: &str, secret: &SharedSecret) -> Result<TransportBinding> {
        self.discover_with_model(host, secret)
            .await
            .map(|(binding, _)| binding)
    }

    /// Resolve `host` to a binding, also returning the probe's model answer
    /// when one was made.
    ///
    /// An explicit host is returned as written without any request.
    pub async fn discover_with_model(
        &self,
        host: &str,
        secret: &SharedSecret,
    ) -> Result<(TransportBinding, Option<ModelAndVersion>)> {
        let host = match HostSpec::parse(host)? {
            HostSpec::Explicit(binding) => {
                debug!(binding = %binding, "explicit host, skipping discovery");
                return Ok((binding, None));
            }
            HostSpec::Bare(host) => host,
        };

        let coder = Arc::new(PayloadCoder::local(secret));
        let mut attempts = Vec::with_capacity(self.order.candidates().len());
        for candidate in self.order.candidates() {
            let binding = candidate.bind(&host)?;
            match self.probe(binding.clone(), &coder).await {
                Ok(model) => {
                    debug!(host = %host, candidate = %candidate, model = %model, "probe succeeded");
                    return Ok((binding, Some(model)));
                }
                Err(err) => match err.transport_category() {
                    Some(category) if category.is_wrong_scheme() => {
                        debug!(host = %host, candidate = %candidate, %category, "probe failed, trying next");
                        attempts.push(ProbeAttempt {
                            candidate: *candidate,
                            category,
                        });
                    }
                    _ => {
                        warn!(host = %host, candidate = %candidate, error = %err, "probe failed");
                        return Err(err);
                    }
                },
            }
        }
        warn!(host = %host, attempts = attempts.len(), "discovery exhausted");
        Err(Error::DiscoveryExhausted { host, attempts })
    }

    async fn probe(
        &self,
        binding: TransportBinding,
        coder: &Arc<PayloadCoder>,
    ) -> Result<ModelAndVersion> {
        let client = TransportClient::new(Arc::clone(&self.transport), binding, self.probe_timeout);
        let channel = RpcChannel::new(client, Arc::clone(coder))?;
        let table = CommandTable::global();
        let command = table.command(PROBE_COMMAND)?;
        let frame = table.encode(PROBE_COMMAND, &[])?;
        match channel.execute(command, &frame).await? {
            Decoded::Fields(fields) => ModelAndVersion::from_fields(&fields),
            other => Err(Error::UnexpectedResponse {
                command: command.name,
                expected: format!("{:02X}", command.response_opcode),
                actual: format!("{:?}", other),
            }),
        }
    }
}

impl fmt::Debug for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discovery")
            .field("order", &self.order)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}
