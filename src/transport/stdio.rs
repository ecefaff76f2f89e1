//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! A mutex-guarded `BufReader<Stdin>` for receive, a mutex-guarded `Stdout`
//! for send, and an atomic closed flag so `is_connected` is cheap to poll
//! from the run loop.
//! All application logging on this transport must go to stderr — stdout is
//! the wire.

use super::{RawMessage, Transport, TransportKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;

pub struct StdioTransport {
    reader: Mutex<BufReader<Stdin>>,
    writer: Mutex<Stdout>,
    closed: AtomicBool,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
            writer: Mutex::new(tokio::io::stdout()),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: RawMessage) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Transport("stdio transport is closed".into()));
        }
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<RawMessage>> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }
        let mut buf = String::new();
        let mut reader = self.reader.lock().await;
        let n = reader.read_line(&mut buf).await?;
        if n == 0 {
            self.closed.store(true, Ordering::Release);
            return Ok(None);
        }
        let trimmed = buf.trim();
        if trimmed.is_empty() {
            return Ok(Some(serde_json::Value::Null));
        }
        let value: RawMessage = serde_json::from_str(trimmed)?;
        Ok(Some(value))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_connected_and_closes() {
        let t = StdioTransport::new();
        assert!(t.is_connected());
        t.close().await.unwrap();
        assert!(!t.is_connected());
    }

    #[tokio::test]
    async fn send_after_close_errors() {
        let t = StdioTransport::new();
        t.close().await.unwrap();
        let result = t.send(serde_json::json!({"ok": true})).await;
        assert!(result.is_err());
    }
}
