//! The three static prompts. Their message bodies are
//! original — `original_source/` kept no files for this distillation — but
//! purpose-matched to their names (see DESIGN.md).

use crate::error::{Error, Result};
use crate::types::protocol::{Content, GetPromptResult, PromptArgument, PromptInfo, PromptMessage};
use serde_json::Value;

pub fn list() -> Vec<PromptInfo> {
    vec![
        PromptInfo {
            name: "apex-run-script".to_string(),
            description: Some("Draft and run an anonymous Apex script for a stated goal.".to_string()),
            arguments: vec![PromptArgument {
                name: "goal".to_string(),
                description: Some("What the Apex script should accomplish.".to_string()),
                required: true,
            }],
        },
        PromptInfo {
            name: "tools-basic-run".to_string(),
            description: Some("Orient a new session around the tools this server exposes.".to_string()),
            arguments: vec![],
        },
        PromptInfo {
            name: "orgOnboarding".to_string(),
            description: Some("Summarize the connected org using salesforceContextUtils.".to_string()),
            arguments: vec![],
        },
    ]
}

pub fn get(name: &str, args: &Value) -> Result<GetPromptResult> {
    match name {
        "apex-run-script" => {
            let goal = args
                .get("goal")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::validation("apex-run-script requires a 'goal' argument"))?;
            Ok(GetPromptResult {
                description: Some("Draft and run an anonymous Apex script.".to_string()),
                messages: vec![PromptMessage {
                    role: "user".to_string(),
                    content: Content::text(format!(
                        "Write an anonymous Apex script that accomplishes the following goal, then call \
                         executeAnonymousApex with it (set mayModify to true only if the script writes data): {goal}"
                    )),
                }],
            })
        }
        "tools-basic-run" => Ok(GetPromptResult {
            description: Some("Orientation for a new session.".to_string()),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: Content::text(
                    "You have access to Salesforce tools: salesforceContextUtils, executeSoqlQuery, \
                     describeObject, getRecord, getRecentlyViewedRecords, getSetupAuditTrail, \
                     executeAnonymousApex, dmlOperation, deployMetadata, createMetadata, runApexTest, \
                     getApexClassCodeCoverage, apexDebugLogs, and invokeApexRestResource. Start by calling \
                     salesforceContextUtils with action=getState to confirm the server is ready.",
                ),
            }],
        }),
        "orgOnboarding" => Ok(GetPromptResult {
            description: Some("Summarize the connected org.".to_string()),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: Content::text(
                    "Call salesforceContextUtils with action=getOrgAndUserDetails, then summarize the \
                     connected org's alias, instance URL, and the current user's name and profile.",
                ),
            }],
        }),
        other => Err(Error::validation(format!("unknown prompt: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_returns_three_prompts() {
        assert_eq!(list().len(), 3);
    }

    #[test]
    fn apex_run_script_requires_goal() {
        let result = get("apex-run-script", &serde_json::json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn tools_basic_run_needs_no_arguments() {
        let result = get("tools-basic-run", &serde_json::json!({}));
        assert!(result.is_ok());
    }

    #[test]
    fn unknown_prompt_errors() {
        assert!(get("nope", &serde_json::json!({})).is_err());
    }
}
