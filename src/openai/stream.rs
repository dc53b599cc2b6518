//! Typed Assistants streaming events decoded from server-sent events.

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use super::http::{SseDecoder, SseFrame};
use super::types::{Message, MessageDelta, Run, RunStep, RunStepDelta, StreamError};
use crate::error::{PaiprogError, Result};

/// Events of interest from a streaming run. Unlisted event names are skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantStreamEvent {
    /// Any `thread.run.*` status event.
    Run(Run),
    StepCreated(RunStep),
    StepDelta(RunStepDelta),
    StepCompleted(RunStep),
    MessageCreated(Message),
    MessageDelta(MessageDelta),
    MessageCompleted(Message),
    Error(StreamError),
    Done,
}

pub type AssistantEventStream = BoxStream<'static, Result<AssistantStreamEvent>>;

/// Decode one SSE frame. Returns `Ok(None)` for events the client ignores.
pub fn decode_frame(frame: &SseFrame) -> Result<Option<AssistantStreamEvent>> {
    let Some(name) = frame.event.as_deref() else {
        return Ok(None);
    };
    let data = frame.data.as_str();

    let event = match name {
        "done" => AssistantStreamEvent::Done,
        "error" => AssistantStreamEvent::Error(serde_json::from_str(data)?),
        "thread.run.step.created" => AssistantStreamEvent::StepCreated(serde_json::from_str(data)?),
        "thread.run.step.delta" => AssistantStreamEvent::StepDelta(serde_json::from_str(data)?),
        "thread.run.step.completed" => {
            AssistantStreamEvent::StepCompleted(serde_json::from_str(data)?)
        }
        "thread.message.created" => {
            AssistantStreamEvent::MessageCreated(serde_json::from_str(data)?)
        }
        "thread.message.delta" => AssistantStreamEvent::MessageDelta(serde_json::from_str(data)?),
        "thread.message.completed" => {
            AssistantStreamEvent::MessageCompleted(serde_json::from_str(data)?)
        }
        run if run.starts_with("thread.run.") && !run.starts_with("thread.run.step.") => {
            AssistantStreamEvent::Run(serde_json::from_str(data)?)
        }
        other => {
            debug!(event = other, "ignoring assistant stream event");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

/// Turn an SSE response into a stream of typed events, ending after `done`.
pub fn event_stream(resp: reqwest::Response) -> AssistantEventStream {
    let byte_stream = resp.bytes_stream();

    let stream = async_stream::try_stream! {
        let mut decoder = SseDecoder::new();
        let mut finished = false;
        futures::pin_mut!(byte_stream);

        'chunks: while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(PaiprogError::Network)?;
            for frame in decoder.push(&chunk) {
                if let Some(event) = decode_frame(&frame)? {
                    finished = event == AssistantStreamEvent::Done;
                    yield event;
                    if finished {
                        break 'chunks;
                    }
                }
            }
        }

        if !finished {
            if let Some(frame) = decoder.finish() {
                if let Some(event) = decode_frame(&frame)? {
                    yield event;
                }
            }
        }
    };

    Box::pin(stream)
}
