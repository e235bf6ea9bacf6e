//! PayloadCoder: JSON-RPC in, transport body out, and back.
//!
//! Local controller traffic is always encrypted. Plaintext mode exists only
//! for the cloud endpoint, which has no shared secret.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::core::{DecryptionError, Error, NakCode, OPCODE_ACK, OPCODE_NAK, Result, TUNNEL_SIP_METHOD};
use crate::crypto::{EncryptedEnvelope, SharedSecret, SymmetricKey};
use crate::protocol::{CommandTable, ProtocolFrame};
use crate::transport::Endpoint;

use super::{RpcRequest, RpcResponse};

/// Body encoding in force for one endpoint.
#[derive(Debug, Clone)]
pub enum CoderMode {
    /// AES-256-CBC envelope keyed by the shared secret.
    Encrypted(SymmetricKey),
    /// Bare JSON. Cloud endpoint only.
    Plain,
}

/// A decoded `tunnelSip` reply, after NAK handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `01` acknowledge: the command succeeded and returns nothing.
    Ack {
        /// Opcode of the acknowledged command.
        command_echo: u8,
    },
    /// Any other response frame.
    Frame(ProtocolFrame),
}

/// Encodes requests and decodes replies for one endpoint.
#[derive(Debug)]
pub struct PayloadCoder {
    mode: CoderMode,
    endpoint: Endpoint,
    next_id: AtomicU64,
}

impl PayloadCoder {
    /// Encrypted coder for the local controller.
    pub fn local(secret: &SharedSecret) -> Self {
        Self {
            mode: CoderMode::Encrypted(secret.derive_key()),
            endpoint: Endpoint::Local,
            next_id: AtomicU64::new(1),
        }
    }

    /// Plaintext coder for the cloud endpoint.
    pub fn cloud() -> Self {
        Self {
            mode: CoderMode::Plain,
            endpoint: Endpoint::Cloud,
            next_id: AtomicU64::new(1),
        }
    }

    /// Pick the coder for `endpoint`.
    ///
    /// A local endpoint without a secret is a configuration error; there is
    /// no plaintext fallback for controller traffic.
    pub fn for_endpoint(endpoint: Endpoint, secret: Option<&SharedSecret>) -> Result<Self> {
        match (endpoint, secret) {
            (Endpoint::Local, Some(secret)) => Ok(Self::local(secret)),
            (Endpoint::Local, None) => Err(Error::Config(
                "local controller requests require a shared secret".into(),
            )),
            (Endpoint::Cloud, _) => Ok(Self::cloud()),
        }
    }

    /// Endpoint this coder serves.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Whether bodies are encrypted.
    pub fn is_encrypted(&self) -> bool {
        matches!(self.mode, CoderMode::Encrypted(_))
    }

    /// Encode a JSON-RPC call as a transport body.
    pub fn encode_rpc(&self, method: &str, params: Value) -> Result<Vec<u8>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        let text = serde_json::to_string(&request)
            .map_err(|e| Error::Config(format!("cannot encode {}: {}", method, e)))?;
        trace!(method, id, "encoding request");
        Ok(match &self.mode {
            CoderMode::Encrypted(key) => EncryptedEnvelope::seal(&text, key).to_bytes(),
            CoderMode::Plain => text.into_bytes(),
        })
    }

    /// Encode a protocol frame as a `tunnelSip` call. `length` is the
    /// request length in bytes from the command table.
    pub fn encode_frame(&self, frame: &ProtocolFrame, length: usize) -> Result<Vec<u8>> {
        debug!(frame = %frame, length, "sending frame");
        self.encode_rpc(TUNNEL_SIP_METHOD, json!({ "data": frame.as_hex(), "length": length }))
    }

    /// Decode a transport body to the JSON-RPC `result` value.
    pub fn decode_rpc(&self, body: &[u8]) -> Result<Value> {
        let text = match &self.mode {
            CoderMode::Encrypted(key) => EncryptedEnvelope::from_bytes(body)?.open(key)?,
            CoderMode::Plain => String::from_utf8(body.to_vec()).map_err(|_| DecryptionError::Utf8)?,
        };
        trace!(response = %text, "decoded response");
        RpcResponse::parse(&text)?.into_result()
    }

    /// Decode a `tunnelSip` reply body, turning NAK frames into
    /// [`Error::DeviceRejected`].
    pub fn decode_frame(&self, body: &[u8]) -> Result<Reply> {
        let result = self.decode_rpc(body)?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedFrame("tunnelSip reply has no data".into()))?;
        let frame = ProtocolFrame::from_hex(data)?;
        debug!(opcode = frame.opcode(), frame = %frame, "received frame");
        classify_reply(frame)
    }
}

/// Split acknowledge, not-acknowledge and data frames.
pub fn classify_reply(frame: ProtocolFrame) -> Result<Reply> {
    match frame.opcode() {
        OPCODE_NAK => {
            let fields = CommandTable::global().decode_response(&frame)?;
            Err(Error::DeviceRejected {
                command_echo: fields.uint("commandEcho")? as u8,
                nak: NakCode::from_byte(fields.uint("nakCode")? as u8),
            })
        }
        OPCODE_ACK => {
            let fields = CommandTable::global().decode_response(&frame)?;
            Ok(Reply::Ack {
                command_echo: fields.uint("commandEcho")? as u8,
            })
        }
        _ => Ok(Reply::Frame(frame)),
    }
}
