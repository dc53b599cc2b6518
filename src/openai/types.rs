//! Wire types for the Assistants API (v2).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{PaiprogError, Result};

/// Lifecycle status of a remote run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
}

impl RunStatus {
    /// Parse a status string, treating anything unrecognised as a protocol error.
    pub fn parse(status: &str) -> Result<Self> {
        status
            .parse()
            .map_err(|_| PaiprogError::protocol(format!("unknown run status '{status}'")))
    }

    /// Statuses after which the run will not move again on its own.
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Queued | Self::InProgress | Self::Cancelling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// A run snapshot. `status` stays a string so unknown values reach the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    pub status: String,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<LastError>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl Run {
    pub fn status(&self) -> Result<RunStatus> {
        RunStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<RemoteToolCall>,
}

/// A tool call requested by the model: `{id, type, function: {name, arguments}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub function: Option<FunctionCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub run_id: Option<String>,
}

/// One content part of a thread message. Only `text` parts are rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
}

impl MessageContent {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(TextContent {
                value: value.into(),
                annotations: Vec::new(),
            }),
        }
    }

    /// The text value, ignoring annotations.
    pub fn as_text(&self) -> Option<&str> {
        match (&*self.kind, &self.text) {
            ("text", Some(text)) => Some(&text.value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
}

/// Paged list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutputSubmission {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
}

/// Body of an assistant create or update request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantRequest {
    pub name: String,
    pub description: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeletionStatus {
    pub id: String,
    pub deleted: bool,
}

/// A run step as delivered by `thread.run.step.*` events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunStep {
    pub id: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Payload of `thread.run.step.delta`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunStepDelta {
    pub id: String,
    pub delta: StepDeltaBody,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepDeltaBody {
    #[serde(default)]
    pub step_details: Option<StepDetailsDelta>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepDetailsDelta {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// Partial tool call; `id` and the function name arrive on the first delta only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Payload of `thread.message.delta`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageDelta {
    pub id: String,
    pub delta: MessageDeltaBody,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub content: Vec<MessageContentDelta>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageContentDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextDelta>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextDelta {
    #[serde(default)]
    pub value: Option<String>,
}

/// Payload of a streaming `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamError {
    #[serde(default)]
    pub message: Option<String>,
}
