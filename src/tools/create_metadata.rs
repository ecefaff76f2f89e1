//! `createMetadata` — scaffolds new metadata via the CLI
//! generator commands.

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
    #[serde(rename = "type")]
    metadata_type: String,
    name: String,
    #[serde(default)]
    output_dir: Option<String>,
    #[serde(default)]
    trigger_s_object: Option<String>,
    #[serde(default)]
    trigger_event: Option<String>,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "createMetadata",
    title: "Create Metadata",
    description: "Scaffolds a new metadata component (class, trigger, etc.) via the CLI.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "type": {"type": "string"},
            "name": {"type": "string"},
            "outputDir": {"type": "string"},
            "triggerSObject": {"type": "string"},
            "triggerEvent": {"type": "string"},
        },
        "required": ["type", "name"],
    }),
    destructive: true,
    read_only: false,
});

pub struct CreateMetadata;

#[async_trait]
impl ToolHandler for CreateMetadata {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let workspace = ctx.workspace.read().clone();

        let generator = match args.metadata_type.as_str() {
            "apexClass" => "apex",
            "apexTrigger" => "trigger",
            "lwc" => "lwc",
            other => return Err(Error::validation(format!("unsupported metadata type: {other}")).into()),
        };

        let mut cli_args = vec!["generate", generator, "--name", args.name.as_str(), "--json"];
        let output_dir = args.output_dir.clone();
        if let Some(dir) = &output_dir {
            cli_args.push("--output-dir");
            cli_args.push(dir.as_str());
        }
        let trigger_sobject = args.trigger_s_object.clone();
        if generator == "trigger" {
            if let Some(sobj) = &trigger_sobject {
                cli_args.push("--sobject");
                cli_args.push(sobj.as_str());
            }
            if let Some(event) = &args.trigger_event {
                cli_args.push("--event");
                cli_args.push(event.as_str());
            }
        }

        let result = ctx.cli.run_json(&cli_args, &workspace).await?;
        Ok(ToolSuccess::new(format!("Generated {} {}.", args.metadata_type, args.name), result))
    }
}
