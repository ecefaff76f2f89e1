//! `describeObject` — memoized per object in the
//! resource store, normalized across UI/Tooling API shapes.

use crate::context::ServerContext;
use crate::dispatcher::{ToolContract, ToolHandler, ToolOutcome, ToolSuccess};
use crate::error::Error;
use crate::gateway::{ApiType, CallOptions, Method};
use crate::resources::{Resource, ResourceAnnotations};
use crate::server::cancellation::RequestHandlerExtra;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
struct Args {
    #[serde(rename = "sObjectName")]
    s_object_name: String,
    #[serde(default)]
    include_fields: bool,
    #[serde(default)]
    include_picklist_values: bool,
    #[serde(default)]
    use_tooling_api: bool,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "describeObject",
    title: "Describe Object",
    description: "Returns a normalized schema description of a Salesforce sObject.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "sObjectName": {"type": "string"},
            "includeFields": {"type": "boolean"},
            "includePicklistValues": {"type": "boolean"},
            "useToolingApi": {"type": "boolean"},
        },
        "required": ["sObjectName"],
    }),
    destructive: false,
    read_only: true,
});

pub struct DescribeObject;

#[async_trait]
impl ToolHandler for DescribeObject {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let cache_uri = format!(
            "describe://{}{}",
            args.s_object_name,
            if args.use_tooling_api { "?tooling" } else { "" }
        );

        if let Some(cached) = ctx.resources.get(&cache_uri) {
            let value: Value = serde_json::from_str(&cached.text).unwrap_or(Value::Null);
            let mut success = ToolSuccess::new(format!("Describe for {} (cached).", args.s_object_name), value);
            if let Some(content) = crate::dispatcher::resource_reference(ctx, &cached) {
                success.content.push(content);
            }
            return Ok(success);
        }

        let api_type = if args.use_tooling_api { ApiType::Tooling } else { ApiType::Rest };
        let service = format!("sobjects/{}/describe", args.s_object_name);
        let raw = ctx
            .gateway
            .call(Method::Get, api_type, &service, None, CallOptions::default())
            .await?;

        let normalized = normalize(&raw, args.include_fields, args.include_picklist_values);

        let resource = Resource {
            uri: cache_uri,
            name: args.s_object_name.clone(),
            description: Some(format!("Schema for {}", args.s_object_name)),
            mime_type: "application/json".to_string(),
            text: normalized.to_string(),
            annotations: ResourceAnnotations {
                last_modified: Utc::now(),
                audience: None,
            },
        };
        ctx.resources.put(resource.clone());

        let mut success = ToolSuccess::new(format!("Describe for {}.", args.s_object_name), normalized);
        if let Some(content) = crate::dispatcher::resource_reference(ctx, &resource) {
            success.content.push(content);
        }
        Ok(success)
    }
}

fn normalize(raw: &Value, include_fields: bool, include_picklist_values: bool) -> Value {
    let fields = if include_fields {
        raw.get("fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .map(|f| {
                        let mut field = serde_json::json!({
                            "name": f.get("name"),
                            "label": f.get("label"),
                            "type": f.get("type"),
                        });
                        if include_picklist_values {
                            field["picklistValues"] = f.get("picklistValues").cloned().unwrap_or(Value::Null);
                        }
                        field
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    serde_json::json!({
        "name": raw.get("name"),
        "label": raw.get("label"),
        "keyPrefix": raw.get("keyPrefix"),
        "fields": fields,
        "recordTypeInfos": raw.get("recordTypeInfos").cloned().unwrap_or(Value::Array(vec![])),
        "childRelationships": raw.get("childRelationships").cloned().unwrap_or(Value::Array(vec![])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_omits_fields_unless_requested() {
        let raw = serde_json::json!({"name": "Account", "fields": [{"name": "Id"}]});
        let normalized = normalize(&raw, false, false);
        assert_eq!(normalized["fields"], serde_json::json!([]));
    }

    #[test]
    fn normalize_includes_picklist_values_when_requested() {
        let raw = serde_json::json!({
            "name": "Account",
            "fields": [{"name": "Type", "picklistValues": [{"value": "A"}]}],
        });
        let normalized = normalize(&raw, true, true);
        assert_eq!(normalized["fields"][0]["picklistValues"][0]["value"], "A");
    }
}
