//! Tool dispatcher: enforces readiness/permissions, resolves the handler,
//! invokes it, and shapes the dual `content`/`structuredContent` result.

use crate::context::ServerContext;
use crate::error::Error;
use crate::resources::Resource;
use crate::server::cancellation::RequestHandlerExtra;
use crate::types::protocol::{CallToolResult, Content, ResourceContents, ToolAnnotations};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static TOOL_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

/// Tools that run ahead of permission validation because they are how a
/// caller diagnoses why the guard is blocking everything else.
pub const UTILITY_TOOL: &str = "salesforceContextUtils";

/// Named but never registered: an agent-chat passthrough would proxy
/// arbitrary client traffic straight to Salesforce, which is explicitly out
/// of scope. Kept as an exemption name so the guard's exclusion list reads
/// the same as the rule it implements, not because such a tool exists here.
pub const AGENT_CHAT_TOOL: &str = "invokeAgentforceChat";

#[derive(Debug, Clone)]
pub struct ToolContract {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub destructive: bool,
    pub read_only: bool,
}

pub struct ToolSuccess {
    pub content: Vec<Content>,
    pub structured: Value,
}

pub struct ToolFailure {
    pub content: Vec<Content>,
    pub structured: Value,
}

pub type ToolOutcome = std::result::Result<ToolSuccess, ToolFailure>;

impl ToolSuccess {
    pub fn new(summary: impl Into<String>, structured: Value) -> Self {
        Self {
            content: vec![Content::text(summary)],
            structured,
        }
    }
}

impl From<Error> for ToolFailure {
    fn from(e: Error) -> Self {
        ToolFailure {
            content: vec![Content::text(e.to_string())],
            structured: e.to_structured(),
        }
    }
}

/// A successful-but-cancelled tool response: elicitation rejection is a
/// *success* carrying `cancelled=true`, never `isError`.
pub fn cancelled_outcome() -> ToolOutcome {
    Ok(ToolSuccess::new(
        "Operation cancelled by user.",
        serde_json::json!({"cancelled": true}),
    ))
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn contract(&self) -> &ToolContract;

    /// Whether this particular call would mutate the org, for the
    /// elicitation gate below. Defaults to the contract's static bit; a
    /// handful of tools (`executeAnonymousApex`, `invokeApexRestResource`)
    /// can't know this until they've looked at their own arguments, so they
    /// override it instead of over-prompting (or under-prompting) every call.
    fn is_destructive(&self, args: &Value) -> bool {
        self.contract().destructive
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, extra: &RequestHandlerExtra) -> ToolOutcome;
}

pub async fn dispatch(
    ctx: &ServerContext,
    registry: &crate::registry::Registry,
    name: &str,
    args: Value,
    extra: &RequestHandlerExtra,
) -> CallToolResult {
    if !TOOL_NAME_PATTERN.is_match(name) {
        let err = Error::validation(format!("invalid tool name: {name}"));
        return to_wire(Err(err.into()));
    }

    let exempt = name == UTILITY_TOOL || name == AGENT_CHAT_TOOL;
    if !exempt {
        let state = ctx.state.read();
        if !state.initialization_complete {
            return to_wire(Err(Error::NotInitialized("server is still initializing".into()).into()));
        }
        if !state.user_permissions_validated && !ctx.config.bypass_permission_check {
            return to_wire(Err(Error::NotInitialized(
                "user does not have the required Salesforce permission set assignment".into(),
            )
            .into()));
        }
    }

    let Some(handler) = registry.get(name) else {
        return to_wire(Err(Error::validation(format!("unknown tool: {name}")).into()));
    };

    let contract = handler.contract();
    if handler.is_destructive(&args) {
        let wants_confirmation = ctx
            .client
            .read()
            .as_ref()
            .map(|c| c.capabilities.supports_elicitation())
            .unwrap_or(false);
        if wants_confirmation {
            match elicit_confirmation(ctx, contract, extra.session_id.as_deref()).await {
                Ok(true) => {}
                Ok(false) => return to_wire(cancelled_outcome()),
                Err(e) => return to_wire(Err(e.into())),
            }
        }
    }

    let outcome = handler.invoke(args, ctx, extra).await;
    to_wire(outcome)
}

/// Elicitation is only attempted when the client advertised the capability.
/// A reply with `action != "accept"` (decline or cancel) aborts the tool.
async fn elicit_confirmation(ctx: &ServerContext, contract: &ToolContract, session_id: Option<&str>) -> crate::error::Result<bool> {
    let message = format!(
        "\"{}\" will modify data in the connected Salesforce org. Proceed?",
        contract.title
    );
    let schema = serde_json::json!({
        "type": "object",
        "properties": {"confirm": {"type": "boolean", "title": "Proceed"}},
        "required": ["confirm"],
    });

    let response = ctx.elicitor.elicit(session_id, message, schema).await?;
    let accepted = response.get("action").and_then(Value::as_str) == Some("accept")
        && response
            .get("content")
            .and_then(|c| c.get("confirm"))
            .and_then(Value::as_bool)
            .unwrap_or(true);
    tracing::info!(tool = contract.name, accepted, "destructive tool confirmation result");
    Ok(accepted)
}

fn to_wire(outcome: ToolOutcome) -> CallToolResult {
    match outcome {
        Ok(success) => CallToolResult {
            content: non_empty(success.content),
            structured_content: as_object(success.structured),
            is_error: false,
        },
        Err(failure) => CallToolResult {
            content: non_empty(failure.content),
            structured_content: as_object(failure.structured),
            is_error: true,
        },
    }
}

fn non_empty(content: Vec<Content>) -> Vec<Content> {
    if content.is_empty() {
        vec![Content::text("")]
    } else {
        content
    }
}

fn as_object(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        serde_json::json!({"value": value})
    }
}

/// Builds the optional reference content item for a resource a tool just
/// stored, per the client's advertised capability: a typed `resource_link`
/// if supported, else an attached `resource`, else the reference is simply
/// omitted.
pub fn resource_reference(ctx: &ServerContext, resource: &Resource) -> Option<Content> {
    let caps = ctx.client.read().as_ref()?.capabilities.clone();
    if caps.supports_resource_links() {
        Some(Content::ResourceLink {
            uri: resource.uri.clone(),
            name: resource.name.clone(),
            description: resource.description.clone(),
            mime_type: Some(resource.mime_type.clone()),
        })
    } else if caps.supports_resources() {
        Some(Content::Resource {
            resource: ResourceContents {
                uri: resource.uri.clone(),
                mime_type: Some(resource.mime_type.clone()),
                text: Some(resource.text.clone()),
            },
        })
    } else {
        None
    }
}

pub fn annotations(contract: &ToolContract) -> ToolAnnotations {
    ToolAnnotations {
        title: Some(contract.title.to_string()),
        destructive_hint: Some(contract.destructive),
        read_only_hint: Some(contract.read_only),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_name_pattern_rejects_path_traversal() {
        assert!(TOOL_NAME_PATTERN.is_match("executeSoqlQuery"));
        assert!(!TOOL_NAME_PATTERN.is_match("../etc/passwd"));
        assert!(!TOOL_NAME_PATTERN.is_match("123tool"));
    }

    #[test]
    fn wire_shape_always_has_content_and_object_structured() {
        let result = to_wire(Ok(ToolSuccess::new("ok", Value::Array(vec![]))));
        assert!(!result.content.is_empty());
        assert!(result.structured_content.is_object());
    }

    #[test]
    fn cancelled_outcome_is_success_not_error() {
        let result = to_wire(cancelled_outcome());
        assert!(!result.is_error);
        assert_eq!(result.structured_content["cancelled"], true);
    }
}
