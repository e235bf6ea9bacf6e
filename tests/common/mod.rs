//! In-process controller double for integration tests.
//!
//! [`MockTransport`] plays a scripted sequence of replies. Every request is
//! decrypted with the test secret and recorded with the binding it was sent
//! on, so tests can assert on frames, methods and transport choice.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rainbird_protocol::core::{Error, FailureCategory, Result};
use rainbird_protocol::crypto::{EncryptedEnvelope, SharedSecret};
use rainbird_protocol::transport::{Endpoint, Transport, TransportBinding, TransportResponse};
use rainbird_protocol::{Controller, ControllerBuilder};
use serde_json::{Value, json};

pub const SECRET: &str = "test-password";

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// `tunnelSip` reply carrying this frame.
    Frame(String),
    /// Arbitrary JSON-RPC `result`.
    Result(Value),
    /// Bare HTTP status with no body.
    Status(u16),
    /// Connection-level failure.
    Fail(FailureCategory),
    /// Never answer.
    Stall,
}

pub fn frame(hex: &str) -> Scripted {
    Scripted::Frame(hex.to_string())
}

/// A request as the controller saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub binding: TransportBinding,
    pub method: String,
    pub params: Value,
}

impl Recorded {
    /// Frame hex of a `tunnelSip` request.
    pub fn data(&self) -> &str {
        self.params["data"].as_str().unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct MockTransport {
    secret: SharedSecret,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            secret: SharedSecret::new(SECRET),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: Scripted) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn push_all(&self, replies: impl IntoIterator<Item = Scripted>) {
        self.script.lock().unwrap().extend(replies);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    fn open(&self, binding: &TransportBinding, body: &[u8]) -> Value {
        let text = match binding.endpoint() {
            Endpoint::Local => EncryptedEnvelope::from_bytes(body)
                .and_then(|envelope| envelope.open(&self.secret.derive_key()))
                .expect("request envelope"),
            Endpoint::Cloud => String::from_utf8(body.to_vec()).expect("plain request"),
        };
        serde_json::from_str(&text).expect("request json")
    }

    fn seal(&self, binding: &TransportBinding, reply: Value) -> Vec<u8> {
        let text = reply.to_string();
        match binding.endpoint() {
            Endpoint::Local => EncryptedEnvelope::seal(&text, &self.secret.derive_key()).to_bytes(),
            Endpoint::Cloud => text.into_bytes(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(
        &self,
        binding: &TransportBinding,
        body: Vec<u8>,
        _timeout: Duration,
    ) -> Result<TransportResponse> {
        let request = self.open(binding, &body);
        self.requests.lock().unwrap().push(Recorded {
            binding: binding.clone(),
            method: request["method"].as_str().unwrap_or_default().to_string(),
            params: request["params"].clone(),
        });

        let next = self.script.lock().unwrap().pop_front();
        let result = match next {
            Some(Scripted::Frame(hex)) => json!({ "data": hex, "length": hex.len() / 2 }),
            Some(Scripted::Result(value)) => value,
            Some(Scripted::Status(status)) => {
                return Ok(TransportResponse {
                    status,
                    body: Vec::new(),
                });
            }
            Some(Scripted::Fail(category)) => return Err(Error::Transport(category)),
            Some(Scripted::Stall) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                return Err(Error::Transport(FailureCategory::Timeout));
            }
            None => return Err(Error::Config("mock script exhausted".into())),
        };
        let reply = json!({ "jsonrpc": "2.0", "id": request["id"], "result": result });
        Ok(TransportResponse::ok(self.seal(binding, reply)))
    }
}

/// Controller bound to an explicit plain-HTTP host, so no probe is sent.
pub async fn controller(transport: &Arc<MockTransport>) -> Controller {
    let config = ControllerBuilder::new()
        .host("http://10.0.0.5")
        .secret(SECRET)
        .build()
        .unwrap();
    Controller::connect(config, transport.clone()).await.unwrap()
}
