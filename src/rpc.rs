//! Routes a parsed JSON-RPC message to the right subsystem. Shared by both
//! transports: stdio drives this directly from its read loop, and the HTTP
//! transport calls it through [`crate::transport::http::MessageHandler`].

use crate::context::ServerContext;
use crate::dispatcher;
use crate::error::Error;
use crate::init::Initializer;
use crate::registry::Registry;
use crate::server::cancellation::{CancellationManager, RequestHandlerExtra};
use crate::types::capabilities::ClientCapabilities;
use crate::types::protocol::{
    CallToolRequestParams, Implementation, JsonRpcError, ListPromptsResult, ListResourcesResult,
    ListToolsResult, ReadResourceResult, RequestId, Response, ResourceContents,
};
use serde_json::Value;
use std::sync::Arc;

pub struct RpcRouter {
    pub ctx: ServerContext,
    pub registry: Arc<Registry>,
    pub logging: Arc<crate::logging::LoggingHandle>,
    cancellation: CancellationManager,
}

impl RpcRouter {
    pub fn new(ctx: ServerContext, logging: Arc<crate::logging::LoggingHandle>) -> Self {
        Self {
            ctx,
            registry: Arc::new(Registry::build()),
            logging,
            cancellation: CancellationManager::new(),
        }
    }

    /// Handles a single parsed JSON-RPC object. Requests get a `Response`;
    /// notifications return `None` (nothing to reply with).
    pub async fn handle(&self, session_id: Option<&str>, message: Value) -> Option<Response> {
        let id = message.get("id").cloned();
        let method = message.get("method").and_then(Value::as_str)?.to_string();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let Some(id_value) = id else {
            self.handle_notification(&method, params).await;
            return None;
        };

        let request_id: RequestId = serde_json::from_value(id_value).ok()?;
        Some(self.handle_request(request_id, &method, params, session_id).await)
    }

    async fn handle_notification(&self, method: &str, params: Value) {
        match method {
            "notifications/roots/list_changed" => {
                let candidate = params
                    .get("roots")
                    .and_then(Value::as_array)
                    .and_then(|r| r.first())
                    .and_then(|r| r.get("uri"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Initializer::on_roots_changed(&self.ctx, candidate);
            }
            "notifications/cancelled" => {
                if let Some(id) = params.get("requestId").cloned().and_then(|v| serde_json::from_value::<RequestId>(v).ok()) {
                    if !self.cancellation.cancel(&id) {
                        tracing::debug!(?id, "cancellation for a completed or unknown request");
                    }
                }
            }
            other => tracing::debug!(method = other, "unhandled notification"),
        }
    }

    async fn handle_request(
        &self,
        id: RequestId,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Response {
        match method {
            "initialize" => self.handle_initialize(id, params, session_id).await,
            "tools/list" => Response::success(
                id,
                serde_json::to_value(ListToolsResult {
                    tools: self.registry.list(),
                })
                .unwrap_or(Value::Null),
            ),
            "tools/call" => self.handle_tool_call(id, params, session_id).await,
            "resources/list" => Response::success(
                id,
                serde_json::to_value(ListResourcesResult {
                    resources: self
                        .ctx
                        .resources
                        .list()
                        .into_iter()
                        .map(|r| crate::types::protocol::ResourceInfo {
                            uri: r.uri,
                            name: r.name,
                            description: r.description,
                            mime_type: Some(r.mime_type),
                        })
                        .collect(),
                })
                .unwrap_or(Value::Null),
            ),
            "resources/templates/list" => Response::success(id, serde_json::json!({"resourceTemplates": []})),
            "resources/read" => self.handle_resource_read(id, params),
            "prompts/list" => Response::success(
                id,
                serde_json::to_value(ListPromptsResult {
                    prompts: crate::prompts::list(),
                })
                .unwrap_or(Value::Null),
            ),
            "prompts/get" => self.handle_prompt_get(id, params),
            "logging/setLevel" => self.handle_set_level(id, params),
            other => Response::failure(
                id,
                JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, format!("unknown method: {other}")),
            ),
        }
    }

    async fn handle_initialize(&self, id: RequestId, params: Value, session_id: Option<&str>) -> Response {
        let client_info: Implementation = match params.get("clientInfo").cloned().map(serde_json::from_value) {
            Some(Ok(v)) => v,
            _ => {
                return Response::failure(
                    id,
                    JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "missing or invalid clientInfo"),
                )
            }
        };
        let capabilities: ClientCapabilities = params
            .get("capabilities")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(crate::init::PROTOCOL_VERSION)
            .to_string();

        match Initializer::run(&self.ctx, client_info, capabilities, protocol_version, self.ctx.roots.as_ref(), session_id).await {
            Ok((protocol_version, server_capabilities, server_info)) => Response::success(
                id,
                serde_json::json!({
                    "protocolVersion": protocol_version,
                    "capabilities": server_capabilities,
                    "serverInfo": server_info,
                }),
            ),
            Err(e) => Response::failure(id, JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string())),
        }
    }

    async fn handle_tool_call(&self, id: RequestId, params: Value, session_id: Option<&str>) -> Response {
        let call: CallToolRequestParams = match serde_json::from_value(params) {
            Ok(v) => v,
            Err(e) => {
                return Response::failure(
                    id,
                    JsonRpcError::new(JsonRpcError::INVALID_PARAMS, format!("invalid tools/call params: {e}")),
                )
            }
        };

        let extra = RequestHandlerExtra {
            request_id: id.clone(),
            cancellation: self.cancellation.begin(id.clone()),
            session_id: session_id.map(str::to_string),
        };

        let result = dispatcher::dispatch(&self.ctx, &self.registry, &call.name, call.arguments, &extra).await;
        self.cancellation.finish(&id);
        Response::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    fn handle_resource_read(&self, id: RequestId, params: Value) -> Response {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return Response::failure(id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "missing uri"));
        };
        match self.ctx.resources.get(uri) {
            Some(resource) => Response::success(
                id,
                serde_json::to_value(ReadResourceResult {
                    contents: vec![ResourceContents {
                        uri: resource.uri,
                        mime_type: Some(resource.mime_type),
                        text: Some(resource.text),
                    }],
                })
                .unwrap_or(Value::Null),
            ),
            None => Response::failure(
                id,
                JsonRpcError::new(JsonRpcError::INVALID_PARAMS, format!("unknown resource: {uri}")),
            ),
        }
    }

    fn handle_set_level(&self, id: RequestId, params: Value) -> Response {
        use clap::ValueEnum;
        let Some(level_str) = params.get("level").and_then(Value::as_str) else {
            return Response::failure(id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "missing level"));
        };
        let Some(level) = crate::cli::LogLevel::from_str(level_str, true).ok() else {
            return Response::failure(
                id,
                JsonRpcError::new(JsonRpcError::INVALID_PARAMS, format!("unknown log level: {level_str}")),
            );
        };
        match self.logging.set_level(level) {
            Ok(()) => {
                self.ctx.state.write().current_log_level = level;
                Response::success(id, serde_json::json!({}))
            }
            Err(e) => Response::failure(id, JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string())),
        }
    }

    fn handle_prompt_get(&self, id: RequestId, params: Value) -> Response {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Response::failure(id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "missing prompt name"));
        };
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);
        match crate::prompts::get(name, &args) {
            Ok(result) => Response::success(id, serde_json::to_value(result).unwrap_or(Value::Null)),
            Err(Error::Validation(msg)) => Response::failure(id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, msg)),
            Err(e) => Response::failure(id, JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl crate::transport::http::MessageHandler for RpcRouter {
    async fn handle(&self, session_id: &str, message: Value) -> crate::error::Result<Value> {
        match RpcRouter::handle(self, Some(session_id), message).await {
            Some(response) => serde_json::to_value(response).map_err(Error::from),
            None => Ok(Value::Null),
        }
    }

    fn status_snapshot(&self) -> Value {
        let state = self.ctx.state.read();
        let org = self.ctx.org.read();
        serde_json::json!({
            "server": {
                "name": "sf-context-mcp",
                "version": env!("CARGO_PKG_VERSION"),
                "protocolVersion": crate::init::PROTOCOL_VERSION,
                "startedAt": state.started_at.to_rfc3339(),
                "ready": state.is_ready(),
            },
            "salesforce": {
                "identified": org.is_identified(),
                "alias": org.alias,
                "instanceUrl": org.instance_url,
                "apiVersion": org.api_version,
                "username": org.username,
                "cacheEntries": self.ctx.gateway.cache_len(),
            },
            "mcp": {
                "tools": self.registry.list().into_iter().map(|t| t.name).collect::<Vec<_>>(),
                "resources": self.ctx.resources.list().into_iter().map(|r| r.uri).collect::<Vec<_>>(),
            },
            "environment": {
                "logLevel": format!("{:?}", state.current_log_level).to_lowercase(),
                "workspace": state.workspace_path,
                "bypassPermissionCheck": self.ctx.config.bypass_permission_check,
            },
        })
    }

    fn complete_response(&self, session_id: &str, response: Value) {
        let parsed: Response = match serde_json::from_value(response) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "malformed reply to a server-initiated request");
                return;
            }
        };
        let transport = crate::jsonrpc::transport_id_for_session(Some(session_id));
        if !self.ctx.protocol.complete(transport, parsed) {
            tracing::debug!(session_id, "reply to a server-initiated request with no matching waiter");
        }
    }
}
