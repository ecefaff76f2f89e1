//! `runApexTest`.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, Deserialize, Default)]
struct Args {
    #[serde(default)]
    class_names: Vec<String>,
    #[serde(default)]
    method_names: Vec<String>,
    #[serde(default)]
    suite_names: Vec<String>,
    #[serde(default)]
    code_coverage: bool,
    #[serde(default)]
    synchronous: bool,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "runApexTest",
    title: "Run Apex Test",
    description: "Kicks off an Apex test run via the CLI and returns its test run id.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "classNames": {"type": "array", "items": {"type": "string"}},
            "methodNames": {"type": "array", "items": {"type": "string"}},
            "suiteNames": {"type": "array", "items": {"type": "string"}},
            "codeCoverage": {"type": "boolean"},
            "synchronous": {"type": "boolean"},
        },
    }),
    destructive: false,
    read_only: true,
});

pub struct RunApexTest;

#[async_trait]
impl ToolHandler for RunApexTest {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let workspace = ctx.workspace.read().clone();

        let mut cli_args = vec!["apex", "run", "test", "--json"];
        for class in &args.class_names {
            cli_args.push("--class-names");
            cli_args.push(class.as_str());
        }
        for method in &args.method_names {
            cli_args.push("--tests");
            cli_args.push(method.as_str());
        }
        for suite in &args.suite_names {
            cli_args.push("--suite-names");
            cli_args.push(suite.as_str());
        }
        if args.code_coverage {
            cli_args.push("--code-coverage");
        }
        if args.synchronous {
            cli_args.push("--synchronous");
        }

        let result = ctx.cli.run_json(&cli_args, &workspace).await?;
        let test_run_id = result
            .get("result")
            .and_then(|r| r.get("testRunId"))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(ToolSuccess::new(
            "Apex test run started.",
            serde_json::json!({"testRunId": test_run_id, "raw": result.get("result").cloned().unwrap_or(Value::Null)}),
        ))
    }
}
