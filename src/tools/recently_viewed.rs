//! `getRecentlyViewedRecords`.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::gateway::{ApiType, CallOptions, Method};
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::LazyLock;

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "getRecentlyViewedRecords",
    title: "Get Recently Viewed Records",
    description: "Lists the current user's recently viewed records.",
    input_schema: serde_json::json!({"type": "object", "properties": {}}),
    destructive: false,
    read_only: true,
});

pub struct GetRecentlyViewedRecords;

#[async_trait]
impl ToolHandler for GetRecentlyViewedRecords {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, _args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let result = ctx
            .gateway
            .call(
                Method::Get,
                ApiType::Rest,
                "query",
                None,
                CallOptions {
                    query_params: vec![(
                        "q".to_string(),
                        "SELECT Id FROM RecentlyViewed ORDER BY LastViewedDate DESC LIMIT 20".to_string(),
                    )],
                    ..Default::default()
                },
            )
            .await?;

        let total_size = result.get("totalSize").and_then(Value::as_i64).unwrap_or(0);
        Ok(ToolSuccess::new(format!("{total_size} recently viewed record(s)."), result))
    }
}
