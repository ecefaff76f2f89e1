//! Streamable HTTP transport: `POST/GET/DELETE /mcp`, plus `/healthz`,
//! `/status`, and `/` diagnostic endpoints.
//!
//! A `dashmap`-backed session table keyed by `mcp-session-id`, header
//! validation on every request after the initializing one, and an SSE
//! stream for server-to-client push (resource list-changed notifications,
//! logging messages). Binding retries ports `base..base+9` before giving up.

use crate::error::{Error, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use futures::stream::Stream;
use serde_json::{json, Value};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const SESSION_HEADER: &str = "mcp-session-id";

/// How many consecutive ports to try after the requested one before
/// reporting a bind failure.
const PORT_PROBE_RANGE: u16 = 10;

struct Session {
    #[allow(dead_code)]
    created_at: Instant,
    /// Outbound channel for this session's SSE stream; `None` once the
    /// client has only ever used plain POST/response (no GET opened yet).
    outbound: Option<mpsc::Sender<Event>>,
}

#[derive(Clone)]
pub struct HttpState {
    sessions: Arc<DashMap<String, Session>>,
    /// Invoked with each parsed JSON-RPC message body; returns the
    /// JSON-RPC response to write back (or push over SSE for notifications
    /// with no direct reply).
    handler: Arc<dyn MessageHandler>,
}

#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, session_id: &str, message: Value) -> Result<Value>;

    /// Snapshot of server/org/tool/resource state for `/status` and
    /// `/healthz`, built without touching the network (no Salesforce call).
    fn status_snapshot(&self) -> Value;

    /// Routes the client's reply to a server-initiated request (e.g.
    /// `elicitation/create`) to whoever is waiting on it.
    fn complete_response(&self, session_id: &str, response: Value);
}

impl HttpState {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            handler,
        }
    }

    fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route(
            "/mcp",
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
}

async fn root(State(state): State<HttpState>) -> impl IntoResponse {
    let status = status_document(&state);
    let body = format!(
        "<!DOCTYPE html><html><head><title>sf-context-mcp</title></head><body>\
         <h1>sf-context-mcp</h1><pre>{}</pre></body></html>",
        serde_json::to_string_pretty(&status).unwrap_or_default()
    );
    axum::response::Html(body)
}

async fn healthz(State(state): State<HttpState>) -> impl IntoResponse {
    let identified = state
        .handler
        .status_snapshot()
        .get("salesforce")
        .and_then(|s| s.get("identified"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let body = json!({
        "status": if identified { "ok" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "activeSessions": state.sessions.len(),
        "serverType": "sf-context-mcp",
        "version": env!("CARGO_PKG_VERSION"),
    });
    let code = if identified { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body))
}

async fn status(State(state): State<HttpState>) -> impl IntoResponse {
    Json(status_document(&state))
}

fn status_document(state: &HttpState) -> Value {
    let mut doc = state.handler.status_snapshot();
    if let Some(obj) = doc.as_object_mut() {
        obj.insert(
            "sessions".to_string(),
            json!({
                "active": state.sessions.len(),
                "ids": state.sessions.iter().map(|e| e.key().clone()).collect::<Vec<_>>(),
            }),
        );
    }
    doc
}

fn validate_headers(headers: &HeaderMap, is_init: bool) -> std::result::Result<Option<String>, StatusCode> {
    let accept_ok = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json") || v.contains("text/event-stream") || v == "*/*")
        .unwrap_or(true);
    if !accept_ok {
        return Err(StatusCode::NOT_ACCEPTABLE);
    }

    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !is_init && session_id.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(session_id)
}

fn is_initialize(message: &Value) -> bool {
    message.get("method").and_then(Value::as_str) == Some("initialize")
}

async fn handle_post(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Json(message): Json<Value>,
) -> impl IntoResponse {
    let init = is_initialize(&message);
    let session_id = match validate_headers(&headers, init) {
        Ok(id) => id,
        Err(status) => return (status, Json(json!({"error": "invalid headers"}))).into_response(),
    };

    let session_id = match session_id {
        Some(id) if state.sessions.contains_key(&id) => id,
        Some(_) => {
            let body = json!({
                "jsonrpc": "2.0",
                "error": {"code": -32600, "message": "unknown or expired mcp-session-id"},
            });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
        None => {
            let id = HttpState::new_session_id();
            state.sessions.insert(
                id.clone(),
                Session {
                    created_at: Instant::now(),
                    outbound: None,
                },
            );
            id
        }
    };

    if crate::jsonrpc::is_response(&message) {
        state.handler.complete_response(&session_id, message);
        return StatusCode::ACCEPTED.into_response();
    }

    match state.handler.handle(&session_id, message).await {
        Ok(response) => {
            let mut resp = Json(response).into_response();
            if let Ok(v) = session_id.parse::<String>() {
                resp.headers_mut().insert(
                    SESSION_HEADER,
                    axum::http::HeaderValue::from_str(&v).unwrap(),
                );
            }
            resp
        }
        Err(e) => {
            let body = json!({"jsonrpc": "2.0", "error": e.to_structured()});
            (StatusCode::OK, Json(body)).into_response()
        }
    }
}

/// Opens the server-push SSE stream for a session already created by a
/// prior POST /mcp initialize call.
async fn handle_get(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let session_id = match validate_headers(&headers, false) {
        Ok(Some(id)) => id,
        Ok(None) => return (StatusCode::BAD_REQUEST, "missing session id").into_response(),
        Err(status) => return (status, "invalid headers").into_response(),
    };

    let Some(mut session) = state.sessions.get_mut(&session_id) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };

    let (tx, rx) = mpsc::channel(32);
    session.outbound = Some(tx);
    drop(session);

    let stream: std::pin::Pin<Box<dyn Stream<Item = std::result::Result<Event, std::convert::Infallible>> + Send>> =
        Box::pin(ReceiverStream::new(rx).map(Ok));
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

async fn handle_delete(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(id) => {
            state.sessions.remove(id);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::BAD_REQUEST,
    }
}

/// Pushes an event (e.g. `notifications/resources/list_changed`) to every
/// session that has an open SSE stream.
pub async fn broadcast(state: &HttpState, message: &Value) {
    let payload = serde_json::to_string(message).unwrap_or_default();
    for entry in state.sessions.iter() {
        if let Some(tx) = &entry.outbound {
            let _ = tx.send(Event::default().data(payload.clone())).await;
        }
    }
}

/// Pushes a server-initiated request (e.g. `elicitation/create`) to a single
/// session's SSE stream. Returns `false` if the session is unknown or has no
/// open stream.
pub async fn send_to_session(state: &HttpState, session_id: &str, message: &Value) -> bool {
    let Some(session) = state.sessions.get(session_id) else {
        return false;
    };
    let Some(tx) = &session.outbound else {
        return false;
    };
    let payload = serde_json::to_string(message).unwrap_or_default();
    tx.send(Event::default().data(payload)).await.is_ok()
}

/// Binds to `preferred`, trying `preferred + 1 ..= preferred + 9` on
/// `AddrInUse` before giving up.
pub async fn bind_with_port_probe(host: &str, preferred: u16) -> Result<TcpListener> {
    for offset in 0..PORT_PROBE_RANGE {
        let port = preferred.wrapping_add(offset);
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| Error::internal(format!("invalid bind address: {e}")))?;
        match StdTcpListener::bind(addr) {
            Ok(std_listener) => {
                std_listener.set_nonblocking(true)?;
                let listener = TcpListener::from_std(std_listener)
                    .map_err(|e| Error::internal(format!("failed to adopt listener: {e}")))?;
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(Error::from(e)),
        }
    }
    Err(Error::Transport(format!(
        "no free port found in range {preferred}..{}",
        preferred.wrapping_add(PORT_PROBE_RANGE)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_request_detected() {
        let msg = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
        assert!(is_initialize(&msg));
        let msg = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call"});
        assert!(!is_initialize(&msg));
    }

    #[tokio::test]
    async fn port_probe_finds_free_port_after_conflict() {
        let blocker = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();
        let listener = bind_with_port_probe("127.0.0.1", port).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), port);
    }
}
