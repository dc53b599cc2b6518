//! Local tools the remote assistant can call.

pub mod arguments;
pub mod batch;
pub mod builtin;
pub mod executor;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use batch::{BatchOutcome, BatchRunner};
pub use registry::{ToolDefinition, ToolRegistry};
pub use tool::{FnTool, Tool, ToolContext, ToolFailure};
pub use types::{ToolCallRequest, ToolCallResult, ToolOutput, ToolParameters};
