//! Capability structures exchanged during MCP initialization.
//!
//! Adapted from a generic MCP capability typing to the narrower shape this
//! server's client descriptor needs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapabilities>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapabilities>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapabilities>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

impl ClientCapabilities {
    pub fn supports_elicitation(&self) -> bool {
        self.elicitation.is_some()
    }

    pub fn supports_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    pub fn supports_roots(&self) -> bool {
        self.roots.is_some()
    }

    /// Resources/resource_links are advertised through `experimental` by
    /// hosts that support MCP's resource-link content type; absent that key
    /// a tool falls back to attaching a `resource` content item, or omits
    /// the reference entirely.
    pub fn supports_resource_links(&self) -> bool {
        self.experimental
            .as_ref()
            .is_some_and(|m| m.contains_key("resource_links"))
    }

    pub fn supports_resources(&self) -> bool {
        self.experimental
            .as_ref()
            .is_some_and(|m| m.contains_key("resources"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptCapabilities>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceCapabilities>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapabilities>,
}

impl ServerCapabilities {
    pub fn full() -> Self {
        Self {
            tools: Some(ToolCapabilities {
                list_changed: Some(true),
            }),
            prompts: Some(PromptCapabilities {
                list_changed: Some(true),
            }),
            resources: Some(ResourceCapabilities {
                subscribe: Some(false),
                list_changed: Some(true),
            }),
            logging: Some(LoggingCapabilities::default()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
}

/// Empty object per the MCP spec — the client just advertises support.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitationCapabilities {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapabilities {
    #[serde(default)]
    pub list_changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elicitation_and_sampling_detection() {
        let caps = ClientCapabilities {
            elicitation: Some(ElicitationCapabilities::default()),
            ..Default::default()
        };
        assert!(caps.supports_elicitation());
        assert!(!caps.supports_sampling());
    }

    #[test]
    fn server_full_capabilities_serialize_tools_listchanged() {
        let caps = ServerCapabilities::full();
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["tools"]["listChanged"], true);
    }
}
