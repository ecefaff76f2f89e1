//! `getApexClassCodeCoverage` — queries Tooling
//! aggregate and per-method coverage tables, normalizes to percentages
//! with worst-first ordering and non-existent classes last.

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
    class_names: Vec<String>,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "getApexClassCodeCoverage",
    title: "Get Apex Class Code Coverage",
    description: "Returns aggregate and per-method code coverage for the given Apex classes.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {"classNames": {"type": "array", "items": {"type": "string"}}},
        "required": ["classNames"],
    }),
    destructive: false,
    read_only: true,
});

pub struct GetApexClassCodeCoverage;

#[derive(Debug, Clone)]
struct ClassCoverage {
    name: String,
    percent: Option<f64>,
    methods: Vec<MethodCoverage>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct MethodCoverage {
    test_class: String,
    test_method: String,
    num_lines_covered: i64,
    num_lines_uncovered: i64,
}

#[async_trait]
impl ToolHandler for GetApexClassCodeCoverage {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        if args.class_names.is_empty() {
            return Err(Error::validation("classNames must not be empty").into());
        }

        let names_clause = args
            .class_names
            .iter()
            .map(|n| format!("'{}'", n.replace('\'', "\\'")))
            .collect::<Vec<_>>()
            .join(", ");

        let query = format!(
            "SELECT ApexClassOrTrigger.Name, NumLinesCovered, NumLinesUncovered FROM ApexCodeCoverageAggregate WHERE ApexClassOrTrigger.Name IN ({names_clause})"
        );

        let result = ctx
            .gateway
            .call(
                Method::Get,
                ApiType::Tooling,
                "query",
                None,
                CallOptions {
                    query_params: vec![("q".to_string(), query)],
                    ..Default::default()
                },
            )
            .await?;

        let per_method_query = format!(
            "SELECT ApexClassOrTrigger.Name, ApexTestClass.Name, TestMethodName, NumLinesCovered, NumLinesUncovered FROM ApexCodeCoverage WHERE ApexClassOrTrigger.Name IN ({names_clause})"
        );
        let per_method_result = ctx
            .gateway
            .call(
                Method::Get,
                ApiType::Tooling,
                "query",
                None,
                CallOptions {
                    query_params: vec![("q".to_string(), per_method_query)],
                    ..Default::default()
                },
            )
            .await?;

        let mut methods_by_name: std::collections::HashMap<String, Vec<MethodCoverage>> = std::collections::HashMap::new();
        for record in per_method_result.get("records").and_then(Value::as_array).cloned().unwrap_or_default() {
            let Some(class_name) = record.get("ApexClassOrTrigger").and_then(|c| c.get("Name")).and_then(Value::as_str) else {
                continue;
            };
            methods_by_name.entry(class_name.to_string()).or_default().push(MethodCoverage {
                test_class: record.get("ApexTestClass").and_then(|c| c.get("Name")).and_then(Value::as_str).unwrap_or_default().to_string(),
                test_method: record.get("TestMethodName").and_then(Value::as_str).unwrap_or_default().to_string(),
                num_lines_covered: record.get("NumLinesCovered").and_then(Value::as_i64).unwrap_or(0),
                num_lines_uncovered: record.get("NumLinesUncovered").and_then(Value::as_i64).unwrap_or(0),
            });
        }

        let records = result.get("records").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut by_name: std::collections::HashMap<String, ClassCoverage> = records
            .into_iter()
            .filter_map(|r| {
                let name = r.get("ApexClassOrTrigger")?.get("Name")?.as_str()?.to_string();
                let covered = r.get("NumLinesCovered").and_then(Value::as_f64).unwrap_or(0.0);
                let uncovered = r.get("NumLinesUncovered").and_then(Value::as_f64).unwrap_or(0.0);
                let total = covered + uncovered;
                let percent = if total > 0.0 { Some((covered / total) * 100.0) } else { None };
                let methods = methods_by_name.remove(&name).unwrap_or_default();
                Some((name.clone(), ClassCoverage { name, percent, methods }))
            })
            .collect();

        let mut ordered: Vec<ClassCoverage> = args
            .class_names
            .iter()
            .map(|name| {
                by_name.remove(name).unwrap_or(ClassCoverage {
                    name: name.clone(),
                    percent: None,
                    methods: methods_by_name.remove(name).unwrap_or_default(),
                })
            })
            .collect();

        // Worst-first; classes with no coverage data (non-existent / never
        // exercised) sort last.
        ordered.sort_by(|a, b| match (a.percent, b.percent) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let structured = serde_json::json!({
            "classes": ordered.iter().map(|c| serde_json::json!({
                "name": c.name,
                "percent": c.percent,
                "methods": c.methods,
            })).collect::<Vec<_>>(),
        });

        Ok(ToolSuccess::new(format!("Coverage for {} class(es).", ordered.len()), structured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_first_ordering_with_missing_last() {
        let mut classes = vec![
            ClassCoverage { name: "Good".into(), percent: Some(95.0), methods: vec![] },
            ClassCoverage { name: "Bad".into(), percent: Some(10.0), methods: vec![] },
            ClassCoverage { name: "Missing".into(), percent: None, methods: vec![] },
        ];
        classes.sort_by(|a, b| match (a.percent, b.percent) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap(),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        let names: Vec<_> = classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bad", "Good", "Missing"]);
    }
}
