//! `executeSoqlQuery`.

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
    query: String,
    #[serde(default)]
    use_tooling_api: bool,
}

static CONTRACT: LazyLock<ToolContract> = LazyLock::new(|| ToolContract {
    name: "executeSoqlQuery",
    title: "Execute SOQL Query",
    description: "Runs a SOQL query against the connected org and returns its records.",
    input_schema: serde_json::json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"},
            "useToolingApi": {"type": "boolean"},
        },
        "required": ["query"],
    }),
    destructive: false,
    read_only: true,
});

pub struct ExecuteSoqlQuery;

#[async_trait]
impl ToolHandler for ExecuteSoqlQuery {
    fn contract(&self) -> &ToolContract {
        &CONTRACT
    }

    async fn invoke(&self, args: Value, ctx: &ServerContext, _extra: &RequestHandlerExtra) -> ToolOutcome {
        let args: Args = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        let escaped = escape_string_literals(&args.query);
        let api_type = if args.use_tooling_api { ApiType::Tooling } else { ApiType::Rest };

        let result = ctx
            .gateway
            .call(
                Method::Get,
                api_type,
                "query",
                None,
                CallOptions {
                    query_params: vec![("q".to_string(), escaped)],
                    ..Default::default()
                },
            )
            .await?;

        let total_size = result.get("totalSize").and_then(Value::as_i64).unwrap_or(0);
        Ok(ToolSuccess::new(
            format!("Query returned {total_size} record(s)."),
            result,
        ))
    }
}

/// Escapes single quotes only inside string literals of the query, not
/// across the whole text. A quote closes its literal when followed by
/// whitespace, `,`, `)`, `;`, or end of input — anything else (a letter, a
/// second quote) is an embedded quote and gets escaped instead, so
/// `'O'Brien'` becomes the single literal `'O\'Brien'` rather than two
/// truncated ones.
fn escape_string_literals(query: &str) -> String {
    let chars: Vec<char> = query.chars().collect();
    let mut out = String::with_capacity(query.len());
    let mut in_literal = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            if !in_literal {
                in_literal = true;
                out.push(c);
            } else if closes_literal(chars.get(i + 1).copied()) {
                in_literal = false;
                out.push(c);
            } else {
                out.push_str("\\'");
            }
        } else if c == '\\' && in_literal {
            out.push_str("\\\\");
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

fn closes_literal(next: Option<char>) -> bool {
    matches!(next, None | Some(' ') | Some('\t') | Some('\n') | Some(',') | Some(')') | Some(';'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_quote_inside_literal() {
        let query = "SELECT Id FROM Account WHERE Name = 'O'Brien'";
        assert_eq!(
            escape_string_literals(query),
            "SELECT Id FROM Account WHERE Name = 'O\\'Brien'"
        );
    }

    #[test]
    fn escapes_multiple_embedded_quotes_in_one_literal() {
        let query = "SELECT Id FROM Account WHERE Name = 'O'Brien's shop'";
        assert_eq!(
            escape_string_literals(query),
            "SELECT Id FROM Account WHERE Name = 'O\\'Brien\\'s shop'"
        );
    }

    #[test]
    fn leaves_query_without_literals_untouched() {
        let query = "SELECT Id, Name FROM Account LIMIT 3";
        assert_eq!(escape_string_literals(query), query);
    }

    #[test]
    fn leaves_in_clause_literals_untouched() {
        let query = "SELECT Id FROM Account WHERE Id IN ('001','002')";
        assert_eq!(escape_string_literals(query), query);
    }
}
