//! Correlation of server-initiated requests (`roots/list`, `elicitation/create`,
//! `sampling/createMessage`) with the client's eventual response.
//!
//! One oneshot channel per outstanding request id, keyed per transport
//! connection so a reply on the wrong connection can never resolve someone
//! else's wait.

use crate::error::{Error, Result};
use crate::types::protocol::{JsonRpcError, RequestId, Response};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Identifies which connection a server-initiated request was sent on, so
/// the reply is only accepted from that same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(pub u64);

#[derive(Default)]
struct Pending {
    waiters: HashMap<RequestId, (TransportId, oneshot::Sender<Response>)>,
}

#[derive(Clone)]
pub struct Protocol {
    pending: Arc<Mutex<Pending>>,
    next_id: Arc<AtomicI64>,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(Pending::default())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a wait for the reply to a request just sent on `transport`.
    /// Returns a receiver that resolves when [`Self::complete`] is called
    /// with a matching id from the same transport, or times out.
    pub fn register(
        &self,
        id: RequestId,
        transport: TransportId,
    ) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().waiters.insert(id, (transport, tx));
        rx
    }

    /// Delivers a response arriving on `transport`. Returns `false` if no
    /// matching waiter exists or the reply came in on the wrong connection
    /// (the waiter is left registered in that case, since a mismatched
    /// transport id means this reply simply isn't for it).
    pub fn complete(&self, transport: TransportId, response: Response) -> bool {
        let mut pending = self.pending.lock();
        let Some((expected_transport, _)) = pending.waiters.get(&response.id) else {
            return false;
        };
        if *expected_transport != transport {
            return false;
        }
        let (_, tx) = pending.waiters.remove(&response.id).unwrap();
        tx.send(response).is_ok()
    }

    /// Drops all waiters registered against `transport`, e.g. on disconnect.
    pub fn cancel_transport(&self, transport: TransportId) {
        self.pending
            .lock()
            .waiters
            .retain(|_, (t, _)| *t != transport);
    }

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
}

pub fn timeout_error(id: RequestId) -> Response {
    Response::failure(
        id,
        JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, "client did not respond in time"),
    )
}

/// A message with no `method` and a `result`/`error` is a reply to a
/// server-initiated request (e.g. `elicitation/create`, `roots/list`), not a
/// new JSON-RPC call.
pub fn is_response(message: &Value) -> bool {
    message.get("method").is_none() && (message.get("result").is_some() || message.get("error").is_some())
}

/// Maps a session to the `TransportId` its server-initiated requests are
/// registered under. Stdio has exactly one connection; HTTP sessions are
/// hashed to a stable id so the same session always maps to the same one.
pub fn transport_id_for_session(session_id: Option<&str>) -> TransportId {
    match session_id {
        None => TransportId(0),
        Some(s) => {
            let mut hasher = DefaultHasher::new();
            s.hash(&mut hasher);
            TransportId(hasher.finish())
        }
    }
}

/// A destructive-tool confirmation prompt, or any other server-initiated
/// request-response exchange with the client. One round trip per call: send
/// a request, wait for the matching reply (or time out).
#[async_trait::async_trait]
pub trait Elicitor: Send + Sync {
    async fn elicit(&self, session_id: Option<&str>, message: String, requested_schema: Value) -> Result<Value>;
}

/// Declines every elicitation. Used before a transport is attached, and as
/// the safe default when a concrete transport can't reach its client (no
/// open HTTP event stream, for instance).
pub struct NullElicitor;

#[async_trait::async_trait]
impl Elicitor for NullElicitor {
    async fn elicit(&self, _session_id: Option<&str>, _message: String, _requested_schema: Value) -> Result<Value> {
        Ok(serde_json::json!({"action": "cancel"}))
    }
}

/// Resolves a `Protocol`-registered wait with the result or error carried by
/// `response`, or a timeout/transport error.
pub(crate) fn interpret_response(response: Response) -> Result<Value> {
    if let Some(result) = response.result {
        Ok(result)
    } else if let Some(err) = response.error {
        Err(Error::internal(format!("client returned an error for a server-initiated request: {}", err.message)))
    } else {
        Err(Error::internal("empty response to a server-initiated request"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_matching_waiter() {
        let proto = Protocol::new();
        let id = proto.next_request_id();
        let rx = proto.register(id.clone(), TransportId(1));
        let delivered = proto.complete(TransportId(1), Response::success(id, serde_json::json!({})));
        assert!(delivered);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn rejects_reply_from_wrong_transport() {
        let proto = Protocol::new();
        let id = proto.next_request_id();
        let _rx = proto.register(id.clone(), TransportId(1));
        let delivered = proto.complete(TransportId(2), Response::success(id, serde_json::json!({})));
        assert!(!delivered);
    }

    #[test]
    fn cancel_transport_drops_its_waiters() {
        let proto = Protocol::new();
        let id = proto.next_request_id();
        let _rx = proto.register(id.clone(), TransportId(1));
        proto.cancel_transport(TransportId(1));
        let delivered = proto.complete(TransportId(1), Response::success(id, serde_json::json!({})));
        assert!(!delivered);
    }
}
