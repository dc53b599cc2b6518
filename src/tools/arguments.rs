//! Validated tool arguments with typed accessors.

use crate::error::ToolError;

/// Arguments handed to a tool after schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    raw: serde_json::Value,
}

impl ToolArguments {
    pub fn new(raw: serde_json::Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    /// Required string field.
    pub fn get_str(&self, key: &str) -> Result<&str, ToolError> {
        self.raw
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing(key, "string"))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        self.raw.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, ToolError> {
        self.raw
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| missing(key, "integer"))
    }
}

fn missing(key: &str, kind: &str) -> ToolError {
    ToolError::Execution {
        tool_name: String::new(),
        message: format!("argument '{key}' is not a {kind}"),
    }
}
