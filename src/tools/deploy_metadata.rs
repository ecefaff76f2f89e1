//! `deployMetadata` — destructive unless
//! `validationOnly`; surfaces the CLI result unchanged.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
struct Args {
    source_dir: String,
    #[serde(default)]
    validation_only: bool,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "deployMetadata",
    title: "Deploy Metadata",
    description: "Deploys or validates metadata from a local source directory.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "sourceDir": {"type": "string"},
            "validationOnly": {"type": "boolean"},
        },
        "required": ["sourceDir"],
    }),
    destructive: true,
    read_only: false,
});

pub struct DeployMetadata;

#[async_trait]
impl ToolHandler for DeployMetadata {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let workspace = ctx.workspace.read().clone();

        let mut cli_args = vec!["project", "deploy", "start", "--source-dir", args.source_dir.as_str(), "--json"];
        if args.validation_only {
            cli_args.push("--dry-run");
        }

        let result = ctx.cli.run_json(&cli_args, &workspace).await.map_err(|e| match e {
            Error::Cli(msg) => Error::Cli(msg),
            other => other,
        })?;

        let status = result.get("status").and_then(Value::as_i64).unwrap_or(1);
        Ok(ToolSuccess::new(
            if status == 0 { "Deploy succeeded." } else { "Deploy reported errors." },
            result,
        ))
    }
}
