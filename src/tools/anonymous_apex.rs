//! `executeAnonymousApex` — writes the Apex body to a
//! temp file under `<workspace>/tmp/`, runs the CLI, and always cleans up
//! the temp file regardless of outcome.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct Args {
    apex_code: String,
    #[serde(default)]
    may_modify: bool,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "executeAnonymousApex",
    title: "Execute Anonymous Apex",
    description: "Runs anonymous Apex via the CLI against the connected org.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "apexCode": {"type": "string"},
            "mayModify": {"type": "boolean"},
        },
        "required": ["apexCode", "mayModify"],
    }),
    destructive: true,
    read_only: false,
});

pub struct ExecuteAnonymousApex;

#[async_trait]
impl ToolHandler for ExecuteAnonymousApex {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    /// `mayModify` is the caller's own declaration of intent; a script that
    /// only reads data shouldn't trigger a confirmation prompt.
    fn is_destructive(&self, args: &Value) -> bool {
        args.get("mayModify").and_then(Value::as_bool).unwrap_or(true)
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;

        let workspace = ctx.workspace.read().clone();
        let tmp_dir = std::path::PathBuf::from(&workspace).join("tmp");
        tokio::fs::create_dir_all(&tmp_dir).await.map_err(Error::from)?;
        sweep_old_temp_files(&tmp_dir).await;

        let file_path = tmp_dir.join(format!("apex-{}.apex", Uuid::new_v4()));
        tokio::fs::write(&file_path, &args.apex_code).await.map_err(Error::from)?;

        let run = ctx
            .cli
            .run_json(&["apex", "run", "--file", file_path.to_str().unwrap_or_default(), "--json"], &workspace)
            .await;

        let _ = tokio::fs::remove_file(&file_path).await;

        let value = run?;
        let result = value.get("result").cloned().unwrap_or(Value::Null);
        let success = result.get("success").and_then(Value::as_bool).unwrap_or(false);

        Ok(ToolSuccess::new(
            if success { "Anonymous Apex executed successfully." } else { "Anonymous Apex execution failed." },
            serde_json::json!({
                "success": success,
                "compiled": result.get("compiled").cloned().unwrap_or(Value::Null),
                "logs": result.get("logs").cloned().unwrap_or(Value::Null),
                "mayModify": args.may_modify,
            }),
        ))
    }
}

/// Idempotent sweep dropping temp files older than the 7-day retention
/// window.
async fn sweep_old_temp_files(dir: &std::path::Path) {
    const RETENTION: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 60 * 60);
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(metadata) = entry.metadata().await {
            if let Ok(modified) = metadata.modified() {
                if modified.elapsed().map(|age| age > RETENTION).unwrap_or(false) {
                    let _ = tokio::fs::remove_file(entry.path()).await;
                }
            }
        }
    }
}
