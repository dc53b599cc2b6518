//! Terminal rendering of turn progress.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::run::ProgressEvent;
use crate::tools::ToolOutput;

/// Writes progress events as the user-facing transcript.
#[derive(Debug, Default)]
pub struct TurnRenderer {
    /// Tool names by call id.
    tools: HashMap<String, String>,
    /// Tool call whose argument line is still open.
    open_tool: Option<String>,
    /// Text was streamed since the last tool batch.
    streamed_text: bool,
}

impl TurnRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, event: &ProgressEvent, out: &mut dyn Write) -> io::Result<()> {
        match event {
            ProgressEvent::TurnStarted { .. } => {
                *self = Self::default();
            }
            ProgressEvent::TextChunk { text } => {
                self.streamed_text = true;
                write!(out, "{text}")?;
                out.flush()?;
            }
            ProgressEvent::TextEnded => writeln!(out)?,
            ProgressEvent::ToolCallStarted { tool_id, tool_name } => {
                self.tools.insert(tool_id.clone(), tool_name.clone());
            }
            ProgressEvent::ToolCallArgumentChunk { tool_id, chunk } => {
                if self.open_tool.as_deref() != Some(tool_id.as_str()) {
                    self.close_tool_line(out)?;
                    let name = self.tools.get(tool_id).map(String::as_str).unwrap_or("tool");
                    write!(out, "Executing {name} with args: ")?;
                    self.open_tool = Some(tool_id.clone());
                }
                write!(out, "{chunk}")?;
                out.flush()?;
            }
            ProgressEvent::ToolCallReady {
                tool_id,
                tool_name,
                arguments,
            } => {
                let streamed = self.open_tool.as_deref() == Some(tool_id.as_str());
                self.close_tool_line(out)?;
                if !streamed {
                    writeln!(out, "Executing {tool_name} with args: {arguments}")?;
                }
            }
            ProgressEvent::ToolCallExecuted {
                tool_name, output, ..
            } => {
                self.close_tool_line(out)?;
                match output {
                    ToolOutput::Success { .. } => {
                        writeln!(out, "✔ Successfully executed {tool_name}")?;
                    }
                    ToolOutput::Failure { error, .. } => {
                        writeln!(out, "✖ Failed to execute {tool_name}")?;
                        writeln!(out, "{error}")?;
                    }
                }
            }
            ProgressEvent::ToolBatchCompleted { .. } => {
                self.streamed_text = false;
                self.tools.clear();
            }
            ProgressEvent::TurnEnded { message } => {
                self.close_tool_line(out)?;
                if !self.streamed_text && !message.is_empty() {
                    writeln!(out, "{message}")?;
                }
            }
            ProgressEvent::TurnAborted => {
                self.close_tool_line(out)?;
                writeln!(out, "Run cancelled.")?;
            }
            ProgressEvent::TurnError { message } => {
                self.close_tool_line(out)?;
                writeln!(out, "Run failed: {message}")?;
            }
            ProgressEvent::TurnExpired => {
                self.close_tool_line(out)?;
                writeln!(out, "Run expired.")?;
            }
            ProgressEvent::UnsupportedContent { kind } => {
                self.close_tool_line(out)?;
                writeln!(out, "Unsupported message content: {kind}")?;
            }
            ProgressEvent::RunStatusChanged { .. }
            | ProgressEvent::StepStarted { .. }
            | ProgressEvent::StepEnded { .. }
            | ProgressEvent::TextStarted
            | ProgressEvent::TokenUsage { .. } => {}
        }
        Ok(())
    }

    fn close_tool_line(&mut self, out: &mut dyn Write) -> io::Result<()> {
        if self.open_tool.take().is_some() {
            writeln!(out)?;
        }
        Ok(())
    }
}
