//! Static tool registry built once at startup. In a statically typed
//! target a small static map is the whole lookup; no secondary dynamic
//! tier is needed.

use crate::dispatcher::ToolHandler;
use crate::types::protocol::ToolInfo;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Registry {
    handlers: HashMap<&'static str, Arc<dyn ToolHandler>>,
}

impl Registry {
    pub fn build() -> Self {
        let mut handlers = HashMap::new();
        for handler in crate::tools::all() {
            handlers.insert(handler.contract().name, handler);
        }
        Self { handlers }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .handlers
            .values()
            .map(|h| {
                let contract = h.contract();
                ToolInfo {
                    name: contract.name.to_string(),
                    description: Some(contract.description.to_string()),
                    input_schema: contract.input_schema.clone(),
                    output_schema: None,
                    annotations: Some(crate::dispatcher::annotations(contract)),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_fourteen_tools() {
        let registry = Registry::build();
        assert_eq!(registry.list().len(), 14);
    }

    #[test]
    fn unknown_tool_returns_none() {
        let registry = Registry::build();
        assert!(registry.get("doesNotExist").is_none());
    }

    #[test]
    fn known_tools_resolve() {
        let registry = Registry::build();
        for name in [
            "salesforceContextUtils",
            "executeSoqlQuery",
            "describeObject",
            "getRecord",
            "getRecentlyViewedRecords",
            "getSetupAuditTrail",
            "executeAnonymousApex",
            "dmlOperation",
            "deployMetadata",
            "createMetadata",
            "runApexTest",
            "getApexClassCodeCoverage",
            "apexDebugLogs",
            "invokeApexRestResource",
        ] {
            assert!(registry.get(name).is_some(), "missing tool: {name}");
        }
    }
}
