pub mod http;
pub mod stdio;

use async_trait::async_trait;
use crate::error::Result;
use serde_json::Value;

/// A single framed JSON-RPC message moving across a transport, before it
/// has been classified as request/response/notification.
pub type RawMessage = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::StreamableHttp => "streamable-http",
        }
    }
}

/// Send and receive whole JSON-RPC messages, independent of framing
/// mechanics.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: RawMessage) -> Result<()>;
    async fn receive(&self) -> Result<Option<RawMessage>>;
    async fn close(&self) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn kind(&self) -> TransportKind;
}
