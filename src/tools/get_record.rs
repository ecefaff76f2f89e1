//! `getRecord`.

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
    #[serde(rename = "sObjectName")]
    s_object_name: String,
    record_id: String,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "getRecord",
    title: "Get Record",
    description: "Fetches a single record by id.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "sObjectName": {"type": "string"},
            "recordId": {"type": "string"},
        },
        "required": ["sObjectName", "recordId"],
    }),
    destructive: false,
    read_only: true,
});

pub struct GetRecord;

#[async_trait]
impl ToolHandler for GetRecord {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let service = format!("sobjects/{}/{}", args.s_object_name, args.record_id);
        let fields = ctx
            .gateway
            .call(Method::Get, ApiType::Rest, &service, None, CallOptions::default())
            .await?;

        Ok(ToolSuccess::new(
            format!("Fetched {} {}.", args.s_object_name, args.record_id),
            serde_json::json!({
                "id": args.record_id,
                "sObject": args.s_object_name,
                "fields": fields,
            }),
        ))
    }
}
