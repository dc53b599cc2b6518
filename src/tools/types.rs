//! Tool-related types: parameter schemas, outputs, call requests and results.

use serde::{Deserialize, Serialize};

/// JSON Schema-based parameter definition for a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    /// JSON Schema object describing the parameters.
    pub schema: serde_json::Value,
}

impl ToolParameters {
    /// Create an empty parameter schema (no parameters).
    pub fn empty() -> Self {
        Self {
            schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }

    /// Builder: create an object schema with properties.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for constructing tool parameter schemas.
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    fn property(
        mut self,
        name: impl Into<String>,
        schema: serde_json::Value,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    /// Add a string property.
    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "string", "description": description.into() }),
            required,
        )
    }

    /// Add an optional string property with a default value.
    pub fn string_with_default(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        default: &str,
    ) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "string",
                "description": description.into(),
                "default": default,
            }),
            false,
        )
    }

    /// Add a boolean property.
    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "boolean", "description": description.into() }),
            required,
        )
    }

    /// Add an integer property.
    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "integer", "description": description.into() }),
            required,
        )
    }

    /// Build into ToolParameters.
    pub fn build(self) -> ToolParameters {
        ToolParameters {
            schema: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// Uniform result envelope for a single tool invocation.
///
/// Serialised as `{"success": true, "output": ...}` or
/// `{"success": false, "error": "...", "output"?: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireToolOutput", try_from = "WireToolOutput")]
pub enum ToolOutput {
    Success {
        output: serde_json::Value,
    },
    Failure {
        error: String,
        output: Option<serde_json::Value>,
    },
}

impl ToolOutput {
    pub fn success(output: impl Into<serde_json::Value>) -> Self {
        Self::Success {
            output: output.into(),
        }
    }

    /// Success with no payload (`output: null`).
    pub fn done() -> Self {
        Self::Success {
            output: serde_json::Value::Null,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            output: None,
        }
    }

    pub fn failure_with_output(error: impl Into<String>, output: serde_json::Value) -> Self {
        Self::Failure {
            error: error.into(),
            output: Some(output),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Error text, present only on failures.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    /// JSON text submitted back to the remote run.
    pub fn to_submission(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"tool output could not be serialized"}"#.to_string()
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolOutput {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default)]
    output: Option<serde_json::Value>,
}

impl From<ToolOutput> for WireToolOutput {
    fn from(value: ToolOutput) -> Self {
        match value {
            ToolOutput::Success { output } => Self {
                success: true,
                error: None,
                output: Some(output),
            },
            ToolOutput::Failure { error, output } => Self {
                success: false,
                error: Some(error),
                output,
            },
        }
    }
}

impl TryFrom<WireToolOutput> for ToolOutput {
    type Error = String;

    fn try_from(value: WireToolOutput) -> Result<Self, Self::Error> {
        match (value.success, value.error) {
            (true, None) => Ok(Self::Success {
                output: value.output.unwrap_or(serde_json::Value::Null),
            }),
            (false, Some(error)) => Ok(Self::Failure {
                error,
                output: value.output,
            }),
            (true, Some(_)) => Err("successful tool output must not carry an error".into()),
            (false, None) => Err("failed tool output requires an error".into()),
        }
    }
}

/// A function call requested by the remote run, consumed once by the batch runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Arguments as the JSON text the model produced.
    pub raw_arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        raw_arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }
}

/// Outcome of one tool call, attributable to its request by `tool_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_id: String,
    pub tool_name: String,
    pub output: ToolOutput,
}
