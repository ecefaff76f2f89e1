//! Per-request cancellation, and the `extra` bundle handed to every tool
//! handler.
//!
//! A table of `CancellationToken`s keyed by request id, so a
//! `notifications/cancelled` message can cancel an in-flight tool call
//! without the dispatcher needing to know anything about what that tool is
//! doing.

use crate::types::protocol::RequestId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct CancellationManager {
    tokens: Arc<DashMap<RequestId, CancellationToken>>,
}

impl CancellationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, id: RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(id, token.clone());
        token
    }

    pub fn cancel(&self, id: &RequestId) -> bool {
        if let Some((_, token)) = self.tokens.remove(id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn finish(&self, id: &RequestId) {
        self.tokens.remove(id);
    }
}

/// Context handed to every tool handler alongside its arguments.
#[derive(Clone)]
pub struct RequestHandlerExtra {
    pub request_id: RequestId,
    pub cancellation: CancellationToken,
    pub session_id: Option<String>,
}

impl RequestHandlerExtra {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_marks_token_cancelled() {
        let mgr = CancellationManager::new();
        let id = RequestId::Number(1);
        let token = mgr.begin(id.clone());
        assert!(!token.is_cancelled());
        assert!(mgr.cancel(&id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_unknown_id_is_noop() {
        let mgr = CancellationManager::new();
        assert!(!mgr.cancel(&RequestId::Number(99)));
    }
}
