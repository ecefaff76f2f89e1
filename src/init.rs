//! The five-phase initialization state machine.
//!
//! Each phase is an async method taking `&ServerContext`; `run()` drives
//! all five in sequence from the `initialize` request handler. Gated state
//! transitions mean no tool call can reach a handler before `Ready`.

use crate::context::ServerContext;
use crate::error::{Error, Result};
use crate::gateway::{ApiType, CallOptions, Method};
use crate::state::{ClientDescriptor, InitState, OrgIdentity, OrgUser};
use crate::types::capabilities::{ClientCapabilities, ServerCapabilities};
use crate::types::protocol::Implementation;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const PROTOCOL_VERSION: &str = "2025-06-18";
const WORKSPACE_WAIT_CEILING: Duration = Duration::from_secs(5);
const LIST_ROOTS_TIMEOUT: Duration = Duration::from_secs(4);
const PERMISSION_SET_NAME: &str = "SF_Context_MCP_Access";

#[async_trait::async_trait]
pub trait RootsProvider: Send + Sync {
    /// Returns the client's advertised roots as raw URIs, bounded by the
    /// caller's own timeout; an `Err` or empty list means "no usable root".
    /// `session_id` identifies which connection to ask (`None` for stdio's
    /// single connection).
    async fn list_roots(&self, session_id: Option<&str>) -> Result<Vec<String>>;
}

/// Used when no client connection is available yet, or as a safe fallback.
pub struct NoRoots;

#[async_trait::async_trait]
impl RootsProvider for NoRoots {
    async fn list_roots(&self, _session_id: Option<&str>) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Sends a real `roots/list` request over the stdio connection and awaits
/// the client's reply via the shared `Protocol` correlation table.
pub struct StdioRootsProvider {
    transport: Arc<crate::transport::stdio::StdioTransport>,
    protocol: Arc<crate::jsonrpc::Protocol>,
}

impl StdioRootsProvider {
    pub fn new(transport: Arc<crate::transport::stdio::StdioTransport>, protocol: Arc<crate::jsonrpc::Protocol>) -> Self {
        Self { transport, protocol }
    }
}

#[async_trait::async_trait]
impl RootsProvider for StdioRootsProvider {
    async fn list_roots(&self, _session_id: Option<&str>) -> Result<Vec<String>> {
        use crate::jsonrpc::{interpret_response, transport_id_for_session, Protocol};
        use crate::transport::Transport;

        let id = self.protocol.next_request_id();
        let rx = self.protocol.register(id.clone(), transport_id_for_session(None));
        let request = serde_json::json!({"jsonrpc": "2.0", "id": id, "method": "roots/list"});
        self.transport.send(request).await?;

        let response = tokio::time::timeout(Protocol::DEFAULT_TIMEOUT, rx)
            .await
            .map_err(|_| Error::internal("client did not respond to roots/list in time"))?
            .map_err(|_| Error::internal("roots channel closed before a reply arrived"))?;
        Ok(extract_roots(interpret_response(response)?))
    }
}

/// Sends `roots/list` over the requesting session's own SSE stream; the
/// reply arrives as a plain `POST /mcp` body routed back through `Protocol`.
pub struct HttpRootsProvider {
    slot: Arc<tokio::sync::OnceCell<crate::transport::http::HttpState>>,
    protocol: Arc<crate::jsonrpc::Protocol>,
}

impl HttpRootsProvider {
    pub fn new(
        slot: Arc<tokio::sync::OnceCell<crate::transport::http::HttpState>>,
        protocol: Arc<crate::jsonrpc::Protocol>,
    ) -> Self {
        Self { slot, protocol }
    }
}

#[async_trait::async_trait]
impl RootsProvider for HttpRootsProvider {
    async fn list_roots(&self, session_id: Option<&str>) -> Result<Vec<String>> {
        use crate::jsonrpc::{interpret_response, transport_id_for_session, Protocol};

        let Some(session_id) = session_id else {
            return Ok(Vec::new());
        };
        let Some(state) = self.slot.get() else {
            return Ok(Vec::new());
        };

        let id = self.protocol.next_request_id();
        let rx = self.protocol.register(id.clone(), transport_id_for_session(Some(session_id)));
        let request = serde_json::json!({"jsonrpc": "2.0", "id": id, "method": "roots/list"});
        if !crate::transport::http::send_to_session(state, session_id, &request).await {
            return Ok(Vec::new());
        }

        let response = tokio::time::timeout(Protocol::DEFAULT_TIMEOUT, rx)
            .await
            .map_err(|_| Error::internal("client did not respond to roots/list in time"))?
            .map_err(|_| Error::internal("roots channel closed before a reply arrived"))?;
        Ok(extract_roots(interpret_response(response)?))
    }
}

fn extract_roots(result: Value) -> Vec<String> {
    result
        .get("roots")
        .and_then(Value::as_array)
        .map(|roots| {
            roots
                .iter()
                .filter_map(|r| r.get("uri").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub struct Initializer;

impl Initializer {
    pub async fn run(
        ctx: &ServerContext,
        client_info: Implementation,
        capabilities: ClientCapabilities,
        protocol_version: String,
        roots: &dyn RootsProvider,
        session_id: Option<&str>,
    ) -> Result<(String, ServerCapabilities, Implementation)> {
        Self::phase1_client_bind(ctx, client_info, capabilities, protocol_version)?;
        Self::phase2_workspace_resolution(ctx, roots, session_id).await?;
        Self::phase3_org_identification(ctx).await?;
        Self::phase4_permission_check(ctx).await?;
        Self::phase5_ready(ctx).await;

        Ok((
            PROTOCOL_VERSION.to_string(),
            ServerCapabilities::full(),
            Implementation {
                name: "sf-context-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        ))
    }

    fn phase1_client_bind(
        ctx: &ServerContext,
        client_info: Implementation,
        capabilities: ClientCapabilities,
        _protocol_version: String,
    ) -> Result<()> {
        *ctx.client.write() = Some(ClientDescriptor {
            name: client_info.name,
            version: client_info.version,
            capabilities,
        });
        let mut state = ctx.state.write();
        state.handshake_validated = true;
        state.init = InitState::ClientBound;
        Ok(())
    }

    async fn phase2_workspace_resolution(ctx: &ServerContext, roots: &dyn RootsProvider, session_id: Option<&str>) -> Result<()> {
        let already_set = ctx.state.read().workspace_path.is_some();
        if already_set {
            return Ok(());
        }

        let mut resolved: Option<String> = ctx.config.workspace_paths.first().cloned();

        if resolved.is_none() {
            let wants_roots = ctx
                .client
                .read()
                .as_ref()
                .map(|c| c.capabilities.supports_roots())
                .unwrap_or(false);
            if wants_roots {
                let roots_list = tokio::time::timeout(LIST_ROOTS_TIMEOUT, roots.list_roots(session_id))
                    .await
                    .ok()
                    .and_then(|r| r.ok())
                    .unwrap_or_default();
                resolved = roots_list.into_iter().find_map(|uri| decode_file_uri(&uri));
            }
        }

        let resolved = resolved.unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string())
        });

        tokio::time::timeout(WORKSPACE_WAIT_CEILING, async {
            let _ = std::env::set_current_dir(&resolved);
        })
        .await
        .map_err(|_| Error::internal("timed out waiting for workspace path"))?;

        let mut state = ctx.state.write();
        state.workspace_path = Some(resolved.clone());
        state.init = InitState::WorkspaceResolved;
        drop(state);
        *ctx.workspace.write() = resolved;
        Ok(())
    }

    /// Later `roots/list_changed` notifications only take effect if no
    /// workspace path has been set yet (single-shot resolution, /// Phase 2).
    pub fn on_roots_changed(ctx: &ServerContext, candidate: Option<String>) {
        let mut state = ctx.state.write();
        if state.workspace_path.is_none() {
            if let Some(path) = candidate {
                state.workspace_path = Some(path);
            }
        }
    }

    async fn phase3_org_identification(ctx: &ServerContext) -> Result<()> {
        let cwd = ctx.workspace.read().clone();
        let target = ctx.target_org.read().clone();
        let raw = ctx.cli.display_org(&cwd, target.as_deref()).await;

        let org: Result<OrgIdentity> = match raw {
            Ok(value) => serde_json::from_value(value).map_err(|e| Error::Cli(format!("malformed display org result: {e}"))),
            Err(e) => Err(e),
        };

        match org {
            Ok(identity) if identity.is_identified() => {
                *ctx.org.write() = identity.clone();
                let mut state = ctx.state.write();
                state.org = identity;
                state.init = InitState::OrgIdentified;
                Ok(())
            }
            _ => {
                let mut state = ctx.state.write();
                state.org = OrgIdentity::default();
                state.user_permissions_validated = false;
                state.mark_failed("unable to identify org: empty or unknown username");
                Err(Error::NotInitialized("unable to identify the connected Salesforce org".into()))
            }
        }
    }

    async fn phase4_permission_check(ctx: &ServerContext) -> Result<()> {
        let username = ctx.state.read().org.username.clone();
        let previous_username = ctx.state.read().last_identified_username.clone();

        if previous_username.as_deref() != Some(username.as_str()) {
            ctx.resources.clear();
        }
        ctx.state.write().last_identified_username = Some(username.clone());

        if ctx.config.bypass_permission_check {
            let mut state = ctx.state.write();
            state.org.user = Some(OrgUser {
                id: String::new(),
                name: username,
                profile_name: String::new(),
                role_name: None,
            });
            state.user_permissions_validated = true;
            state.init = InitState::PermissionsValidated;
            return Ok(());
        }

        let query = format!(
            "SELECT Id, Name, Profile.Name, (SELECT PermissionSet.Name FROM PermissionSetAssignments WHERE PermissionSet.Name = '{}') FROM User WHERE Username = '{}'",
            escape_soql_literal(PERMISSION_SET_NAME),
            escape_soql_literal(&username),
        );

        let result = ctx
            .gateway
            .call(
                Method::Get,
                ApiType::Rest,
                "query",
                None,
                CallOptions {
                    query_params: vec![("q".to_string(), query)],
                    ..Default::default()
                },
            )
            .await;

        let mut state = ctx.state.write();
        match result {
            Ok(value) => {
                let records = value.get("records").and_then(|r| r.as_array()).cloned().unwrap_or_default();
                let has_assignment = records.first().and_then(|r| r.get("PermissionSetAssignments")).is_some();
                if let Some(record) = records.first() {
                    state.org.user = Some(OrgUser {
                        id: record.get("Id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                        name: record.get("Name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                        profile_name: record
                            .get("Profile")
                            .and_then(|p| p.get("Name"))
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        role_name: None,
                    });
                }
                state.user_permissions_validated = has_assignment;
                if !has_assignment {
                    tracing::warn!(username = %username, "user lacks required permission set assignment");
                }
            }
            Err(e) => {
                tracing::warn!(username = %username, error = %e, "permission check query failed");
                state.user_permissions_validated = false;
            }
        }
        state.init = InitState::PermissionsValidated;
        Ok(())
    }

    async fn phase5_ready(ctx: &ServerContext) {
        let cwd = ctx.workspace.read().clone();
        let config_path = std::path::PathBuf::from(&cwd).join(".sf").join("config.json");
        let current_alias = ctx.org.read().alias.clone();
        let ctx_for_watcher = ctx.clone();
        if let Ok(handle) = crate::watcher::start(config_path, current_alias, move |event| {
            let ctx = ctx_for_watcher.clone();
            tokio::spawn(async move {
                tracing::info!(?event, "target-org changed, re-running identification");
                let _ = Initializer::phase3_org_identification(&ctx).await;
                let _ = Initializer::phase4_permission_check(&ctx).await;
                ctx.resources.clear();
            });
        }) {
            *ctx.watcher_handle.lock().await = Some(handle);
        }

        let release_ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = release_ctx
                .gateway
                .call(Method::Get, ApiType::Rest, "/services/data/", None, CallOptions::default())
                .await
            {
                tracing::warn!(error = %e, "release name background refresh failed");
            }
        });

        let company_ctx = ctx.clone();
        tokio::spawn(async move {
            let result = company_ctx
                .gateway
                .call(
                    Method::Get,
                    ApiType::Rest,
                    "query",
                    None,
                    CallOptions {
                        query_params: vec![("q".to_string(), "SELECT Id, Name, OrganizationType FROM Organization LIMIT 1".to_string())],
                        ..Default::default()
                    },
                )
                .await;
            match result {
                Ok(value) => {
                    company_ctx.state.write().org.company_details = value.get("records").and_then(|r| r.get(0)).cloned();
                }
                Err(e) => tracing::warn!(error = %e, "company details background refresh failed"),
            }
        });

        let mut state = ctx.state.write();
        state.init = InitState::Ready;
        state.initialization_complete = true;
    }
}

fn escape_soql_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn decode_file_uri(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("file://")?;
    let decoded = urlencoding::decode(rest).ok()?.into_owned();
    // Windows URIs look like file:///C:/path — strip the extra leading slash.
    if decoded.len() >= 3 && decoded.starts_with('/') && decoded.as_bytes()[2] == b':' {
        Some(decoded[1..].to_string())
    } else {
        Some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_file_uri_handles_unix_paths() {
        assert_eq!(decode_file_uri("file:///home/user/project"), Some("/home/user/project".to_string()));
    }

    #[test]
    fn decode_file_uri_handles_windows_drive_letters() {
        assert_eq!(decode_file_uri("file:///C:/Users/dev/project"), Some("C:/Users/dev/project".to_string()));
    }

    #[test]
    fn decode_file_uri_rejects_non_file_scheme() {
        assert_eq!(decode_file_uri("https://example.com"), None);
    }

    #[test]
    fn escape_soql_literal_escapes_quotes() {
        assert_eq!(escape_soql_literal("O'Brien"), "O\\'Brien");
    }

    #[tokio::test]
    async fn roots_changed_is_single_shot() {
        use crate::cli::{LogLevel, TransportKind};
        use crate::config::Config;
        use crate::notify::NullNotifier;
        use std::sync::Arc;

        let config = Config {
            transport: TransportKind::Stdio,
            port: 3000,
            log_level: LogLevel::Info,
            workspace_paths: vec![],
            bypass_permission_check: true,
            allow_insecure_tls: false,
            cache_ttl_ms: 10_000,
            cache_max_entries: 200,
            resource_store_capacity: 30,
            sf_cli_path: "sf".into(),
        };
        let ctx = ServerContext::new(
            config,
            Arc::new(NullNotifier),
            Arc::new(crate::jsonrpc::Protocol::new()),
            Arc::new(crate::jsonrpc::NullElicitor),
            Arc::new(NoRoots),
        )
        .unwrap();
        Initializer::on_roots_changed(&ctx, Some("/first".to_string()));
        Initializer::on_roots_changed(&ctx, Some("/second".to_string()));
        assert_eq!(ctx.state.read().workspace_path, Some("/first".to_string()));
    }
}
