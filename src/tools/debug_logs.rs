//! `apexDebugLogs` — multiplexes on/off/status/list/get.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::gateway::{ApiType, CallOptions, Method};
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

const DEBUG_LEVEL_NAME: &str = "SF_Context_MCP";
const TRACE_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Deserialize)]
struct Args {
    action: String,
    #[serde(default)]
    log_id: Option<String>,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "apexDebugLogs",
    title: "Apex Debug Logs",
    description: "Manages Apex debug log tracing: on, off, status, list, get.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "action": {"type": "string", "enum": ["on", "off", "status", "list", "get"]},
            "logId": {"type": "string"},
        },
        "required": ["action"],
    }),
    destructive: false,
    read_only: true,
});

pub struct ApexDebugLogs;

#[async_trait]
impl ToolHandler for ApexDebugLogs {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;

        match args.action.as_str() {
            "on" => {
                let user_id = traced_user_id(ctx)?;
                let debug_level_id = find_or_create_debug_level(ctx).await?;
                let expiration = Utc::now() + ChronoDuration::minutes(TRACE_DURATION_MINUTES);

                match find_trace_flag(ctx, &user_id).await? {
                    Some(existing) => {
                        let id = existing.get("Id").and_then(Value::as_str).unwrap_or_default();
                        let service = format!("sobjects/TraceFlag/{id}");
                        ctx.gateway
                            .call(
                                Method::Patch,
                                ApiType::Tooling,
                                &service,
                                Some(serde_json::json!({"ExpirationDate": expiration.to_rfc3339()})),
                                CallOptions::default(),
                            )
                            .await?;
                    }
                    None => {
                        let body = serde_json::json!({
                            "TracedEntityId": user_id,
                            "DebugLevelId": debug_level_id,
                            "LogType": "USER_DEBUG",
                            "StartDate": Utc::now().to_rfc3339(),
                            "ExpirationDate": expiration.to_rfc3339(),
                        });
                        ctx.gateway
                            .call(Method::Post, ApiType::Tooling, "sobjects/TraceFlag", Some(body), CallOptions::default())
                            .await?;
                    }
                }

                Ok(ToolSuccess::new(
                    format!("Debug log tracing on until {}.", expiration.to_rfc3339()),
                    serde_json::json!({"action": "on", "expiration": expiration.to_rfc3339()}),
                ))
            }
            "off" => {
                let user_id = traced_user_id(ctx)?;
                match find_trace_flag(ctx, &user_id).await? {
                    Some(existing) => {
                        let id = existing.get("Id").and_then(Value::as_str).unwrap_or_default();
                        let service = format!("sobjects/TraceFlag/{id}");
                        ctx.gateway.call(Method::Delete, ApiType::Tooling, &service, None, CallOptions::default()).await?;
                        Ok(ToolSuccess::new(
                            "Debug log tracing off.",
                            serde_json::json!({"action": "off", "removed": true}),
                        ))
                    }
                    None => Ok(ToolSuccess::new(
                        "Debug log tracing was already off.",
                        serde_json::json!({"action": "off", "removed": false}),
                    )),
                }
            }
            "status" => {
                let user_id = traced_user_id(ctx)?;
                match find_trace_flag(ctx, &user_id).await? {
                    Some(existing) => {
                        let expiration = existing.get("ExpirationDate").and_then(Value::as_str).unwrap_or_default();
                        let active = chrono::DateTime::parse_from_rfc3339(expiration)
                            .map(|e| e > Utc::now())
                            .unwrap_or(false);
                        Ok(ToolSuccess::new(
                            format!("Debug log tracing is {}.", if active { "on" } else { "off" }),
                            serde_json::json!({"action": "status", "active": active, "expiration": expiration}),
                        ))
                    }
                    None => Ok(ToolSuccess::new(
                        "Debug log tracing is off.",
                        serde_json::json!({"action": "status", "active": false, "expiration": Value::Null}),
                    )),
                }
            }
            "list" => {
                let workspace = ctx.workspace.read().clone();
                let result = ctx.cli.run_json(&["apex", "log", "list", "--json"], &workspace).await?;
                Ok(ToolSuccess::new(
                    "Listed debug logs.",
                    serde_json::json!({"action": "list", "logs": result.get("result").cloned().unwrap_or(Value::Null)}),
                ))
            }
            "get" => {
                let log_id = args.log_id.ok_or_else(|| Error::validation("logId is required for action=get"))?;
                let service = format!("sobjects/ApexLog/{log_id}/Body");
                let body = ctx
                    .gateway
                    .call(Method::Get, ApiType::Rest, &service, None, CallOptions::default())
                    .await?;
                Ok(ToolSuccess::new(
                    format!("Fetched log {log_id}."),
                    serde_json::json!({"action": "get", "logId": log_id, "body": body}),
                ))
            }
            other => Err(Error::validation(format!("unknown action: {other}")).into()),
        }
    }
}

fn traced_user_id(ctx: &ServerContext) -> crate::error::Result<String> {
    ctx.state
        .read()
        .org
        .user
        .as_ref()
        .map(|u| u.id.clone())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::NotInitialized("org user id is not yet known".into()))
}

/// The most recently created `USER_DEBUG` trace flag for `user_id`, if any.
async fn find_trace_flag(ctx: &ServerContext, user_id: &str) -> crate::error::Result<Option<Value>> {
    let query = format!(
        "SELECT Id, ExpirationDate FROM TraceFlag WHERE TracedEntityId = '{}' AND LogType = 'USER_DEBUG' ORDER BY CreatedDate DESC LIMIT 1",
        user_id.replace('\'', "\\'")
    );
    let result = ctx
        .gateway
        .call(
            Method::Get,
            ApiType::Tooling,
            "query",
            None,
            CallOptions {
                query_params: vec![("q".to_string(), query)],
                ..Default::default()
            },
        )
        .await?;
    Ok(result.get("records").and_then(Value::as_array).and_then(|r| r.first()).cloned())
}

/// Finds this server's `DebugLevel`, creating it on first use.
async fn find_or_create_debug_level(ctx: &ServerContext) -> crate::error::Result<String> {
    let query = format!("SELECT Id FROM DebugLevel WHERE DeveloperName = '{DEBUG_LEVEL_NAME}' LIMIT 1");
    let result = ctx
        .gateway
        .call(
            Method::Get,
            ApiType::Tooling,
            "query",
            None,
            CallOptions {
                query_params: vec![("q".to_string(), query)],
                ..Default::default()
            },
        )
        .await?;
    if let Some(id) = result
        .get("records")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .and_then(|r| r.get("Id"))
        .and_then(Value::as_str)
    {
        return Ok(id.to_string());
    }

    let body = serde_json::json!({
        "DeveloperName": DEBUG_LEVEL_NAME,
        "MasterLabel": DEBUG_LEVEL_NAME,
        "ApexCode": "DEBUG",
        "ApexProfiling": "INFO",
        "Callout": "INFO",
        "Database": "INFO",
        "System": "DEBUG",
        "Validation": "INFO",
        "Visualforce": "INFO",
        "Workflow": "INFO",
    });
    let created = ctx
        .gateway
        .call(Method::Post, ApiType::Tooling, "sobjects/DebugLevel", Some(body), CallOptions::default())
        .await?;
    created
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::internal("DebugLevel creation did not return an id"))
}
