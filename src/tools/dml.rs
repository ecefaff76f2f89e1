//! `dmlOperation` — batches create/update/delete via
//! the UI API batch endpoint, collating per-record outcomes.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::gateway::{ApiType, CallOptions, Method};
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, Deserialize, Default)]
struct Operations {
    #[serde(default)]
    create: Vec<Value>,
    #[serde(default)]
    update: Vec<Value>,
    #[serde(default)]
    delete: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Args {
    operations: Operations,
    #[serde(default = "default_true")]
    all_or_none: bool,
    #[serde(default)]
    use_tooling_api: bool,
}

fn default_true() -> bool {
    true
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "dmlOperation",
    title: "DML Operation",
    description: "Batches create/update/delete DML operations against the connected org.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "operations": {
                "type": "object",
                "properties": {
                    "create": {"type": "array"},
                    "update": {"type": "array"},
                    "delete": {"type": "array"},
                },
            },
            "allOrNone": {"type": "boolean"},
            "useToolingApi": {"type": "boolean"},
        },
        "required": ["operations"],
    }),
    destructive: true,
    read_only: false,
});

pub struct DmlOperation;

#[async_trait]
impl ToolHandler for DmlOperation {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let api_type = if args.use_tooling_api { ApiType::Tooling } else { ApiType::Ui };

        let body = serde_json::json!({
            "allOrNone": args.all_or_none,
            "create": args.operations.create,
            "update": args.operations.update,
            "delete": args.operations.delete,
        });

        let result = ctx
            .gateway
            .call(Method::Post, api_type, "records/batch", Some(body), CallOptions::default())
            .await?;

        let results = result.get("results").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut successes = Vec::new();
        let mut errors = Vec::new();
        for record in &results {
            if record.get("errors").and_then(Value::as_array).map(|a| a.is_empty()).unwrap_or(true) {
                successes.push(record.clone());
            } else {
                errors.push(record.clone());
            }
        }

        let outcome = if errors.is_empty() {
            "success"
        } else if successes.is_empty() {
            "error"
        } else {
            "partial"
        };

        Ok(ToolSuccess::new(
            format!("DML completed: {outcome}."),
            serde_json::json!({
                "outcome": outcome,
                "statistics": {"successCount": successes.len(), "errorCount": errors.len()},
                "successes": successes,
                "errors": errors,
            }),
        ))
    }
}
