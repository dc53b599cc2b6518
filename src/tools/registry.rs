//! Static tool registry built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::tool::Tool;
use crate::error::ToolError;

/// Definition sent to the remote assistant for one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// `{"type":"function","function":{...}}` as the Assistants API expects.
    pub fn to_assistant_tool(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Read-only map from tool name to implementation.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Build the registry, failing on the first duplicated name.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self, ToolError> {
        let mut registry = Self::default();
        for tool in tools {
            let name = tool.name().to_string();
            if registry.tools.contains_key(&name) {
                return Err(ToolError::DuplicateTool(name));
            }
            registry.order.push(name.clone());
            registry.tools.insert(name, tool);
        }
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Keep only the named tools; unknown names are an error.
    pub fn restricted_to(&self, names: &[String]) -> Result<Self, ToolError> {
        let mut tools = Vec::with_capacity(names.len());
        for name in names {
            let tool = self
                .lookup(name)
                .ok_or_else(|| ToolError::UnknownTool(name.clone()))?;
            tools.push(tool.clone());
        }
        Self::new(tools)
    }

    /// Tool names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters().schema.clone(),
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}
