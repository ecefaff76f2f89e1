//! `salesforceContextUtils` — the multi-action utility
//! tool, exempt from the permission guard because it's how a user diagnoses
//! why the guard is blocking everything else.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::gateway::{ApiType, CallOptions, Method};
use crate::resources::{sanitize, Resource, ResourceAnnotations};
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
struct Args {
    action: String,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "salesforceContextUtils",
    title: "Salesforce Context Utilities",
    description: "Diagnostic and housekeeping actions: getState, getOrgAndUserDetails, clearCache, loadRecordPrefixesResource, getCurrentDatetime, reportIssue.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["getState", "getOrgAndUserDetails", "clearCache", "loadRecordPrefixesResource", "getCurrentDatetime", "reportIssue"],
            },
        },
        "required": ["action"],
    }),
    destructive: false,
    read_only: true,
});

pub struct SalesforceContextUtils;

#[async_trait]
impl ToolHandler for SalesforceContextUtils {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;

        match args.action.as_str() {
            "getState" => {
                let state = ctx.state.read();
                let structured = serde_json::json!({
                    "status": "success",
                    "action": "getState",
                    "initializationComplete": state.initialization_complete,
                    "userPermissionsValidated": state.user_permissions_validated,
                    "handshakeValidated": state.handshake_validated,
                    "workspacePath": state.workspace_path,
                    "currentLogLevel": format!("{:?}", state.current_log_level),
                });
                Ok(ToolSuccess::new("Server state.", structured))
            }
            "getOrgAndUserDetails" => {
                let org = sanitize(&serde_json::to_value(&ctx.state.read().org).unwrap_or(Value::Null), &HashSet::new());
                Ok(ToolSuccess::new(
                    "Org and user details.",
                    serde_json::json!({"status": "success", "action": "getOrgAndUserDetails", "org": org}),
                ))
            }
            "clearCache" => {
                ctx.gateway.clear_cache();
                Ok(ToolSuccess::new(
                    "Cache cleared.",
                    serde_json::json!({"status": "success", "action": "clearCache"}),
                ))
            }
            "loadRecordPrefixesResource" => {
                let result = ctx
                    .gateway
                    .call(Method::Get, ApiType::Rest, "sobjects", None, CallOptions::default())
                    .await?;
                let prefixes: Vec<Value> = result
                    .get("sobjects")
                    .and_then(Value::as_array)
                    .map(|objs| {
                        objs.iter()
                            .filter_map(|o| {
                                let name = o.get("name")?.as_str()?;
                                let prefix = o.get("keyPrefix")?.as_str()?;
                                Some(serde_json::json!({"name": name, "keyPrefix": prefix}))
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let resource = Resource {
                    uri: "salesforce://record-prefixes".to_string(),
                    name: "Record Prefixes".to_string(),
                    description: Some("sObject key prefix lookup table".to_string()),
                    mime_type: "application/json".to_string(),
                    text: serde_json::Value::Array(prefixes.clone()).to_string(),
                    annotations: ResourceAnnotations {
                        last_modified: Utc::now(),
                        audience: None,
                    },
                };
                ctx.resources.put(resource.clone());

                let mut success = ToolSuccess::new(
                    "Record prefixes loaded.",
                    serde_json::json!({"status": "success", "action": "loadRecordPrefixesResource", "count": prefixes.len()}),
                );
                if let Some(content) = crate::dispatcher::resource_reference(ctx, &resource) {
                    success.content.push(content);
                }
                Ok(success)
            }
            "getCurrentDatetime" => Ok(ToolSuccess::new(
                "Current datetime.",
                serde_json::json!({"status": "success", "action": "getCurrentDatetime", "datetime": Utc::now().to_rfc3339()}),
            )),
            "reportIssue" => Ok(ToolSuccess::new(
                "Issue reporting is not available from this server; please file issues through your organization's support channel.",
                serde_json::json!({"status": "success", "action": "reportIssue", "reported": false}),
            )),
            other => Err(Error::validation(format!("unknown action: {other}")).into()),
        }
    }
}
