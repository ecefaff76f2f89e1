//! Logger/notification interface taken as a constructor argument, replacing
//! a process-global back-reference to the transport.

use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_mcp_str(&self) -> &'static str {
        match self {
            LogLevel::Emergency => "emergency",
            LogLevel::Alert => "alert",
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressToken(pub String);

fn notification(method: &str, params: Value) -> Value {
    serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params})
}

pub trait Notifier: Send + Sync {
    fn tools_list_changed(&self);
    fn resources_list_changed(&self);
    fn prompts_list_changed(&self);
    fn log(&self, level: LogLevel, logger: &str, data: Value);
    fn progress(&self, token: ProgressToken, progress: f64, total: Option<f64>);
}

/// A `Notifier` that drops every notification. Used before a transport is
/// attached (e.g. while constructing a `ServerContext` for unit tests).
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn tools_list_changed(&self) {}
    fn resources_list_changed(&self) {}
    fn prompts_list_changed(&self) {}
    fn log(&self, _level: LogLevel, _logger: &str, _data: Value) {}
    fn progress(&self, _token: ProgressToken, _progress: f64, _total: Option<f64>) {}
}

/// Frames notifications onto the stdio transport's own writer. `Notifier`'s
/// methods are synchronous (the trait is called from plain sync code all
/// over the tool handlers), so each one hands its message to a spawned task
/// rather than awaiting the write itself.
pub struct StdioNotifier {
    transport: Arc<crate::transport::stdio::StdioTransport>,
}

impl StdioNotifier {
    pub fn new(transport: Arc<crate::transport::stdio::StdioTransport>) -> Self {
        Self { transport }
    }

    fn send(&self, message: Value) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            use crate::transport::Transport;
            if let Err(e) = transport.send(message).await {
                tracing::warn!(error = %e, "failed to deliver notification over stdio");
            }
        });
    }
}

impl Notifier for StdioNotifier {
    fn tools_list_changed(&self) {
        self.send(notification("notifications/tools/list_changed", serde_json::json!({})));
    }

    fn resources_list_changed(&self) {
        self.send(notification("notifications/resources/list_changed", serde_json::json!({})));
    }

    fn prompts_list_changed(&self) {
        self.send(notification("notifications/prompts/list_changed", serde_json::json!({})));
    }

    fn log(&self, level: LogLevel, logger: &str, data: Value) {
        self.send(notification(
            "notifications/message",
            serde_json::json!({"level": level.as_mcp_str(), "logger": logger, "data": data}),
        ));
    }

    fn progress(&self, token: ProgressToken, progress: f64, total: Option<f64>) {
        self.send(notification(
            "notifications/progress",
            serde_json::json!({"progressToken": token.0, "progress": progress, "total": total}),
        ));
    }
}

/// Broadcasts notifications to every HTTP session with an open SSE stream.
pub struct HttpNotifier {
    state: crate::transport::http::HttpState,
}

impl HttpNotifier {
    pub fn new(state: crate::transport::http::HttpState) -> Self {
        Self { state }
    }

    fn send(&self, message: Value) {
        let state = self.state.clone();
        tokio::spawn(async move {
            crate::transport::http::broadcast(&state, &message).await;
        });
    }
}

impl Notifier for HttpNotifier {
    fn tools_list_changed(&self) {
        self.send(notification("notifications/tools/list_changed", serde_json::json!({})));
    }

    fn resources_list_changed(&self) {
        self.send(notification("notifications/resources/list_changed", serde_json::json!({})));
    }

    fn prompts_list_changed(&self) {
        self.send(notification("notifications/prompts/list_changed", serde_json::json!({})));
    }

    fn log(&self, level: LogLevel, logger: &str, data: Value) {
        self.send(notification(
            "notifications/message",
            serde_json::json!({"level": level.as_mcp_str(), "logger": logger, "data": data}),
        ));
    }

    fn progress(&self, token: ProgressToken, progress: f64, total: Option<f64>) {
        self.send(notification(
            "notifications/progress",
            serde_json::json!({"progressToken": token.0, "progress": progress, "total": total}),
        ));
    }
}

/// Sends a server-initiated `elicitation/create` request over the single
/// stdio connection and awaits the matching response via the shared
/// `Protocol` correlation table.
pub struct StdioElicitor {
    transport: Arc<crate::transport::stdio::StdioTransport>,
    protocol: Arc<crate::jsonrpc::Protocol>,
}

impl StdioElicitor {
    pub fn new(transport: Arc<crate::transport::stdio::StdioTransport>, protocol: Arc<crate::jsonrpc::Protocol>) -> Self {
        Self { transport, protocol }
    }
}

#[async_trait::async_trait]
impl crate::jsonrpc::Elicitor for StdioElicitor {
    async fn elicit(&self, _session_id: Option<&str>, message: String, requested_schema: Value) -> crate::error::Result<Value> {
        use crate::jsonrpc::{transport_id_for_session, interpret_response, Protocol};
        use crate::transport::Transport;

        let id = self.protocol.next_request_id();
        let rx = self.protocol.register(id.clone(), transport_id_for_session(None));
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "elicitation/create",
            "params": {"message": message, "requestedSchema": requested_schema},
        });
        self.transport.send(request).await?;

        match tokio::time::timeout(Protocol::DEFAULT_TIMEOUT, rx).await {
            Ok(Ok(response)) => interpret_response(response),
            Ok(Err(_)) => Err(crate::error::Error::internal("elicitation channel closed before a reply arrived")),
            Err(_) => Err(crate::error::Error::internal("client did not respond to elicitation in time")),
        }
    }
}

/// Pushes the `elicitation/create` request over the requesting session's own
/// SSE stream and awaits the matching reply, which arrives as a plain
/// `POST /mcp` response body routed back through the shared `Protocol`.
pub struct HttpElicitor {
    slot: Arc<tokio::sync::OnceCell<crate::transport::http::HttpState>>,
    protocol: Arc<crate::jsonrpc::Protocol>,
}

impl HttpElicitor {
    pub fn new(
        slot: Arc<tokio::sync::OnceCell<crate::transport::http::HttpState>>,
        protocol: Arc<crate::jsonrpc::Protocol>,
    ) -> Self {
        Self { slot, protocol }
    }
}

#[async_trait::async_trait]
impl crate::jsonrpc::Elicitor for HttpElicitor {
    async fn elicit(&self, session_id: Option<&str>, message: String, requested_schema: Value) -> crate::error::Result<Value> {
        use crate::jsonrpc::{transport_id_for_session, interpret_response, Protocol};

        let Some(session_id) = session_id else {
            return Err(crate::error::Error::internal("elicitation requires an http session"));
        };
        let Some(state) = self.slot.get() else {
            return Err(crate::error::Error::internal("http transport is not ready yet"));
        };

        let id = self.protocol.next_request_id();
        let rx = self.protocol.register(id.clone(), transport_id_for_session(Some(session_id)));
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "elicitation/create",
            "params": {"message": message, "requestedSchema": requested_schema},
        });
        if !crate::transport::http::send_to_session(state, session_id, &request).await {
            return Err(crate::error::Error::internal("no open event stream for this session"));
        }

        match tokio::time::timeout(Protocol::DEFAULT_TIMEOUT, rx).await {
            Ok(Ok(response)) => interpret_response(response),
            Ok(Err(_)) => Err(crate::error::Error::internal("elicitation channel closed before a reply arrived")),
            Err(_) => Err(crate::error::Error::internal("client did not respond to elicitation in time")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_notifier_does_not_panic() {
        let n = NullNotifier;
        n.tools_list_changed();
        n.log(LogLevel::Info, "test", serde_json::json!({}));
        n.progress(ProgressToken("t".into()), 0.5, Some(1.0));
    }
}
