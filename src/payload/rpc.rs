//! JSON-RPC 2.0 request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{DecryptionError, Error, JSONRPC_VERSION, Result, RpcErrorCode};

/// Outgoing JSON-RPC request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    /// Request id.
    pub id: u64,
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Method name.
    pub method: &'a str,
    /// Method parameters.
    pub params: Value,
}

impl<'a> RpcRequest<'a> {
    /// Build a request.
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// JSON-RPC `error` member.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    /// Error code, when present.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error message, when present.
    #[serde(default)]
    pub message: Option<String>,
}

/// Incoming JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Echoed id; controllers sometimes send a string.
    #[serde(default)]
    pub id: Value,
    /// Result member.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error member.
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Parse a response from its JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Decryption(DecryptionError::Json(e.to_string())))
    }

    /// The `result` member, or the `error` member as [`Error::Rpc`].
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(Error::Rpc {
                code: error.code.map_or(RpcErrorCode::Unknown(0), RpcErrorCode::from),
                message: error.message.unwrap_or_default(),
            });
        }
        self.result.ok_or_else(|| {
            Error::Decryption(DecryptionError::Json(
                "response has neither result nor error".into(),
            ))
        })
    }
}
