//! `getSetupAuditTrail`.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::gateway::{ApiType, CallOptions, Method};
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
struct Args {
    #[serde(default = "default_last_days")]
    last_days: i64,
    #[serde(default)]
    user: Option<String>,
}

fn default_last_days() -> i64 {
    7
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "getSetupAuditTrail",
    title: "Get Setup Audit Trail",
    description: "Returns setup audit trail entries, optionally filtered by user and lookback window.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "lastDays": {"type": "integer"},
            "user": {"type": "string"},
        },
    }),
    destructive: false,
    read_only: true,
});

pub struct GetSetupAuditTrail;

#[async_trait]
impl ToolHandler for GetSetupAuditTrail {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let mut query = format!(
            "SELECT Action, Section, CreatedDate, Display, CreatedBy.Name FROM SetupAuditTrail WHERE CreatedDate = LAST_N_DAYS:{}",
            args.last_days.max(1)
        );
        if let Some(user) = &args.user {
            query.push_str(&format!(" AND CreatedBy.Name = '{}'", user.replace('\'', "\\'")));
        }
        query.push_str(" ORDER BY CreatedDate DESC");

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
            .await?;

        let total_size = result.get("totalSize").and_then(Value::as_i64).unwrap_or(0);
        Ok(ToolSuccess::new(format!("{total_size} audit trail entr(y/ies)."), result))
    }
}
