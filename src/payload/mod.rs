//! JSON-RPC payloads, the PayloadCoder and the channel that drives them.

mod channel;
mod coder;
mod rpc;

pub use channel::RpcChannel;
pub use coder::{CoderMode, PayloadCoder, Reply, classify_reply};
pub use rpc::{RpcErrorObject, RpcRequest, RpcResponse};
