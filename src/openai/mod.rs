//! OpenAI Assistants API (v2) client.

pub mod client;
pub mod http;
pub mod stream;
pub mod types;

pub use client::OpenAiClient;
pub use stream::AssistantStreamEvent;
pub use types::{MessageContent, Run, RunStatus, ToolOutputSubmission};
