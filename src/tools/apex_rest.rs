//! `invokeApexRestResource`.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::gateway::{ApiType, CallOptions, Method};
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
struct Args {
    apex_class_or_rest_resource_name: String,
    operation: String,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    url_params: HashMap<String, String>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "invokeApexRestResource",
    title: "Invoke Apex REST Resource",
    description: "Invokes a custom Apex REST resource exposed by the org.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "apexClassOrRestResourceName": {"type": "string"},
            "operation": {"type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"]},
            "body": {"type": "object"},
            "urlParams": {"type": "object"},
            "headers": {"type": "object"},
        },
        "required": ["apexClassOrRestResourceName", "operation"],
    }),
    // This tool's contract annotations depend on the connected resource's
    // own mutation semantics, which this server cannot introspect statically.
    destructive: true,
    read_only: false,
});

pub struct InvokeApexRestResource;

#[async_trait]
impl ToolHandler for InvokeApexRestResource {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    /// The resource's own mutation semantics can't be introspected, but the
    /// HTTP verb the caller chose is a reasonable proxy: a `GET` is
    /// conventionally non-mutating, everything else is treated as a write.
    fn is_destructive(&self, args: &Value) -> bool {
        args.get("operation")
            .and_then(Value::as_str)
            .map(|op| !op.eq_ignore_ascii_case("GET"))
            .unwrap_or(true)
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let method = Method::parse(&args.operation)?;
        let query_params = args.url_params.into_iter().collect::<Vec<_>>();

        let result = ctx
            .gateway
            .call(
                method,
                ApiType::Apex,
                &args.apex_class_or_rest_resource_name,
                args.body,
                CallOptions {
                    query_params,
                    headers: args.headers,
                    ..Default::default()
                },
            )
            .await?;

        Ok(ToolSuccess::new(
            format!("Invoked {}.", args.apex_class_or_rest_resource_name),
            result,
        ))
    }
}
