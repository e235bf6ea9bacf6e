//! Discovery plus facade construction.

use std::sync::Arc;

use tracing::info;

use crate::core::Result;
use crate::payload::{PayloadCoder, RpcChannel};
use crate::transport::{Discovery, Transport, TransportBinding, TransportClient};

use super::{Controller, ControllerConfig};

impl Controller {
    /// Discover the controller described by `config` over `transport` and
    /// build a facade bound to the result.
    ///
    /// The probe's model answer seeds the cache, so busy retry is already
    /// in force for models that need it.
    pub async fn connect(config: ControllerConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let discovery = Discovery::new(Arc::clone(&transport))
            .with_order(config.probe_order.clone())
            .with_probe_timeout(config.probe_timeout);
        let (binding, model) = discovery
            .discover_with_model(&config.host, &config.secret)
            .await?;
        info!(binding = %binding, "controller bound");

        let local = RpcChannel::new(
            TransportClient::new(Arc::clone(&transport), binding, config.request_timeout),
            Arc::new(PayloadCoder::local(&config.secret)),
        )?;
        let cloud = config
            .cloud_url
            .as_deref()
            .map(|url| -> Result<RpcChannel> {
                let client = TransportClient::new(
                    Arc::clone(&transport),
                    TransportBinding::cloud(url)?,
                    config.request_timeout,
                );
                RpcChannel::new(client, Arc::new(PayloadCoder::cloud()))
            })
            .transpose()?;

        let controller = Controller::new(local, cloud, config.retry_policy);
        if let Some(model) = model {
            controller.seed_model(model).await;
        }
        Ok(controller)
    }
}

/// Connect to the controller at `host` over HTTP with default settings.
#[cfg(feature = "http")]
pub async fn create_controller(
    host: &str,
    secret: impl Into<crate::crypto::SharedSecret>,
) -> Result<Controller> {
    let config = super::ControllerBuilder::new()
        .host(host)
        .secret(secret)
        .build()?;
    let transport = Arc::new(crate::transport::HttpTransport::new()?);
    Controller::connect(config, transport).await
}
