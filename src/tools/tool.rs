//! Tool trait, failure shapes and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::{ToolOutput, ToolParameters};

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Id of the remote tool call being served.
    pub tool_call_id: Option<String>,
    /// Cancelled when the turn is interrupted.
    pub cancel: CancellationToken,
}

/// The shapes a tool failure can take before normalisation.
#[derive(Debug)]
pub enum ToolFailure {
    /// A bare message.
    Message(String),
    /// A structured error exposing a message.
    Error(Box<dyn std::error::Error + Send + Sync>),
    /// A child process that exited unsuccessfully.
    Process {
        program: String,
        status: Option<i32>,
        stderr: String,
    },
    /// Any other diagnostic value.
    Value(serde_json::Value),
    /// The tool panicked.
    Panic(String),
}

impl From<String> for ToolFailure {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for ToolFailure {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<std::io::Error> for ToolFailure {
    fn from(err: std::io::Error) -> Self {
        Self::Error(Box::new(err))
    }
}

impl From<reqwest::Error> for ToolFailure {
    fn from(err: reqwest::Error) -> Self {
        Self::Error(Box::new(err))
    }
}

impl From<crate::error::ToolError> for ToolFailure {
    fn from(err: crate::error::ToolError) -> Self {
        Self::Error(Box::new(err))
    }
}

/// Core tool trait: implement to expose a local function to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Run the tool with arguments that already passed schema validation.
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, ToolFailure>;
}

type ToolHandler = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolFailure>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct FnTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolFailure>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, ToolFailure> {
        (self.handler)(args, ctx).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_tool_delegates_to_closure() {
        let tool = FnTool::new(
            "echo",
            "Echo the text argument",
            ToolParameters::object().string("text", "Text", true).build(),
            |args, _ctx| async move { Ok(ToolOutput::success(args.get_str("text")?.to_string())) },
        );

        let output = tool
            .call(
                ToolArguments::new(serde_json::json!({ "text": "hi" })),
                ToolContext::default(),
            )
            .await
            .expect("call should succeed");

        assert_eq!(output, ToolOutput::success("hi"));
        assert_eq!(tool.name(), "echo");
    }
}
