//! A coder paired with a bound transport client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::{Error, OPCODE_ACK, Result};
use crate::protocol::{CommandDescriptor, CommandTable, Decoded, ProtocolFrame};
use crate::transport::{TransportBinding, TransportClient};

use super::{PayloadCoder, Reply};

/// One endpoint's request path: encode, send, decode.
#[derive(Debug, Clone)]
pub struct RpcChannel {
    client: TransportClient,
    coder: Arc<PayloadCoder>,
}

impl RpcChannel {
    /// Pair `coder` with `client`. Both must target the same endpoint.
    pub fn new(client: TransportClient, coder: Arc<PayloadCoder>) -> Result<Self> {
        if coder.endpoint() != client.binding().endpoint() {
            return Err(Error::Config(format!(
                "{:?} coder cannot serve a {:?} binding",
                coder.endpoint(),
                client.binding().endpoint()
            )));
        }
        Ok(Self { client, coder })
    }

    /// The shared binding.
    pub fn binding(&self) -> &Arc<TransportBinding> {
        self.client.binding()
    }

    /// The bound transport client.
    pub fn client(&self) -> &TransportClient {
        &self.client
    }

    /// Same binding and coder, different timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            client: self.client.with_timeout(timeout),
            coder: Arc::clone(&self.coder),
        }
    }

    /// Call a JSON-RPC method and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = self.coder.encode_rpc(method, params)?;
        let reply = self.client.send(body).await?;
        self.coder.decode_rpc(&reply)
    }

    /// Tunnel one frame and classify the reply.
    pub async fn tunnel(&self, frame: &ProtocolFrame, length: usize) -> Result<Reply> {
        let body = self.coder.encode_frame(frame, length)?;
        let reply = self.client.send(body).await?;
        self.coder.decode_frame(&reply)
    }

    /// Tunnel an encoded `command` and decode the reply against it.
    pub async fn execute(
        &self,
        command: &'static CommandDescriptor,
        frame: &ProtocolFrame,
    ) -> Result<Decoded> {
        match self.tunnel(frame, command.length).await? {
            Reply::Ack { command_echo } if command.response_opcode == OPCODE_ACK => {
                Ok(Decoded::Ack { command_echo })
            }
            Reply::Ack { .. } => Err(Error::UnexpectedResponse {
                command: command.name,
                expected: format!("{:02X}", command.response_opcode),
                actual: "01".into(),
            }),
            Reply::Frame(reply) => CommandTable::global().decode(command, &reply),
        }
    }
}
