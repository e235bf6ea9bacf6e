//! Controller configuration and its builder.

use std::time::Duration;

use crate::core::{CLOUD_API_URL, DEFAULT_PROBE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, Error, Result};
use crate::crypto::SharedSecret;
use crate::transport::{ProbeOrder, RetryPolicy};

/// Everything needed to reach one controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Bare host, or a URL with an explicit scheme or path.
    pub host: String,

    /// Controller password.
    pub secret: SharedSecret,

    /// Timeout for each steady-state request.
    pub request_timeout: Duration,

    /// Timeout for each discovery probe.
    pub probe_timeout: Duration,

    /// Discovery candidates in probe order.
    pub probe_order: ProbeOrder,

    /// Busy-retry schedule, applied when the model asks for it.
    pub retry_policy: RetryPolicy,

    /// Cloud API URL; `None` disables the cloud operations.
    pub cloud_url: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            secret: SharedSecret::new(""),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_order: ProbeOrder::default(),
            retry_policy: RetryPolicy::default(),
            cloud_url: Some(CLOUD_API_URL.to_string()),
        }
    }
}

impl ControllerConfig {
    /// Reject configurations that can never connect.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host is required".into()));
        }
        if self.secret.expose().is_empty() {
            return Err(Error::Config("shared secret is required".into()));
        }
        if self.request_timeout.is_zero() || self.probe_timeout.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        if self.retry_policy.max_attempts == 0 {
            return Err(Error::Config("retry policy needs at least one attempt".into()));
        }
        Ok(())
    }
}

/// Builder for [`ControllerConfig`].
#[derive(Debug, Default)]
pub struct ControllerBuilder {
    config: ControllerConfig,
}

impl ControllerBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the controller password.
    pub fn secret(mut self, secret: impl Into<SharedSecret>) -> Self {
        self.config.secret = secret.into();
        self
    }

    /// Set the steady-state request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the discovery probe timeout.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Set the discovery probe order.
    pub fn probe_order(mut self, order: ProbeOrder) -> Self {
        self.config.probe_order = order;
        self
    }

    /// Set the busy-retry schedule.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Set the cloud API URL.
    pub fn cloud_url(mut self, url: impl Into<String>) -> Self {
        self.config.cloud_url = Some(url.into());
        self
    }

    /// Disable the cloud operations.
    pub fn without_cloud(mut self) -> Self {
        self.config.cloud_url = None;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<ControllerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert_eq!(config.probe_timeout, Duration::from_secs(10));
        assert_eq!(config.cloud_url.as_deref(), Some(CLOUD_API_URL));
        assert_eq!(config.probe_order.candidates().len(), 3);
    }

    #[test]
    fn test_builder() {
        let config = ControllerBuilder::new()
            .host("10.0.0.5")
            .secret("pw")
            .request_timeout(Duration::from_secs(5))
            .without_cloud()
            .build()
            .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.secret.expose(), "pw");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.cloud_url.is_none());
    }

    #[test]
    fn test_builder_rejects_missing_fields() {
        assert!(matches!(
            ControllerBuilder::new().secret("pw").build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ControllerBuilder::new().host("10.0.0.5").build(),
            Err(Error::Config(_))
        ));
        assert!(
            ControllerBuilder::new()
                .host("10.0.0.5")
                .secret("pw")
                .probe_timeout(Duration::ZERO)
                .build()
                .is_err()
        );
    }
}
