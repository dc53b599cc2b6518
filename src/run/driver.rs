//! Turn driver: reconciles remote run state and executes requested tool calls.
//!
//! A turn moves through four phases. It starts the run, observes the feed,
//! executes a tool batch when the run requires action, and submits the
//! outputs, which hands back a new feed. The cycle repeats until the run
//! settles. Every turn ends with exactly one terminal [`ProgressEvent`],
//! unless it fails with an error.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{EventEmitter, ProgressEvent, TurnEvent};
use super::session::{lock, RunSession, SharedSession, TurnGuard};
use super::transport::{RemoteRunEvent, RunFeed, RunTransport};
use crate::error::{PaiprogError, Result};
use crate::openai::types::{MessageContent, Run, RunStatus, ToolOutputSubmission, Usage};
use crate::tools::batch::{unsupported_call_kind, BatchRunner};
use crate::tools::{ToolCallRequest, ToolCallResult, ToolRegistry};

/// Collaborators a driver needs.
pub struct DriverContext {
    pub transport: Arc<dyn RunTransport>,
    pub thread_id: String,
    pub assistant_id: String,
    pub registry: Arc<ToolRegistry>,
}

/// Drives turns on one thread, one at a time.
pub struct RunDriver {
    transport: Arc<dyn RunTransport>,
    thread_id: String,
    assistant_id: String,
    runner: BatchRunner,
    session: SharedSession,
}

impl RunDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self {
            session: Arc::new(Mutex::new(RunSession::new(ctx.thread_id.clone()))),
            transport: ctx.transport,
            thread_id: ctx.thread_id,
            assistant_id: ctx.assistant_id,
            runner: BatchRunner::new(ctx.registry),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn is_turn_active(&self) -> bool {
        lock(&self.session).turn_active
    }

    /// Handle that can interrupt the active turn from another task.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            session: self.session.clone(),
            transport: self.transport.clone(),
            thread_id: self.thread_id.clone(),
        }
    }

    pub async fn interrupt(&self) {
        self.interrupt_handle().interrupt().await;
    }

    /// Start a turn with `text` as the user message.
    ///
    /// Fails with [`PaiprogError::InvalidState`] while an earlier turn is
    /// unresolved and was not interrupted. Nothing is sent until the returned
    /// stream is polled.
    pub fn send_message(&self, text: impl Into<String>) -> Result<TurnStream> {
        let turn_id = Uuid::new_v4();
        let cancel = lock(&self.session).begin_turn(turn_id)?;
        debug!(thread_id = %self.thread_id, %turn_id, "turn started");

        let worker = TurnWorker {
            guard: TurnGuard::new(self.session.clone(), turn_id),
            transport: self.transport.clone(),
            runner: self.runner.clone(),
            thread_id: self.thread_id.clone(),
            cancel,
            phase: Phase::Start {
                assistant_id: self.assistant_id.clone(),
                text: text.into(),
            },
            run_id: None,
            last_status: None,
            announced: HashSet::new(),
            last_message: None,
            text_open: false,
            usage_reported: false,
        };

        let inner = async_stream::try_stream! {
            let mut worker = worker;
            let mut emitter = EventEmitter::new(turn_id);
            let mut finished = false;

            while !finished {
                for event in worker.advance().await? {
                    finished = event.is_terminal();
                    yield emitter.wrap(event);
                    if finished {
                        break;
                    }
                }
            }
            worker.guard.release();
        };

        Ok(TurnStream {
            turn_id,
            inner: Box::pin(inner),
        })
    }
}

impl std::fmt::Debug for RunDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunDriver")
            .field("thread_id", &self.thread_id)
            .field("assistant_id", &self.assistant_id)
            .field("session", &self.session)
            .finish()
    }
}

/// Interrupts the active turn of a driver. Cheap to clone.
#[derive(Clone)]
pub struct InterruptHandle {
    session: SharedSession,
    transport: Arc<dyn RunTransport>,
    thread_id: String,
}

impl InterruptHandle {
    /// Flag the turn as interrupted and ask the remote to cancel its run.
    ///
    /// Idempotent. Cancellation is requested at most once per run id and any
    /// error from it is logged and dropped.
    pub async fn interrupt(&self) {
        let run_id = lock(&self.session).interrupt();
        let Some(run_id) = run_id else {
            return;
        };
        request_cancel(self.transport.as_ref(), &self.thread_id, &run_id).await;
    }
}

impl std::fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptHandle")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

async fn request_cancel(transport: &dyn RunTransport, thread_id: &str, run_id: &str) {
    debug!(thread_id, run_id, "requesting run cancellation");
    if let Err(err) = transport.cancel_run(thread_id, run_id).await {
        warn!(thread_id, run_id, error = %err, "cancel request failed");
    }
}

/// Lazy, finite stream of one turn's events.
pub struct TurnStream {
    turn_id: Uuid,
    inner: BoxStream<'static, Result<TurnEvent>>,
}

impl TurnStream {
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }
}

impl Stream for TurnStream {
    type Item = Result<TurnEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("turn_id", &self.turn_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Turn worker
// ---------------------------------------------------------------------------

enum Phase {
    Start { assistant_id: String, text: String },
    Observe(RunFeed),
    Execute(PendingBatch),
    Submit {
        run_id: String,
        outputs: Vec<ToolOutputSubmission>,
    },
    Finished,
}

struct PendingBatch {
    run_id: String,
    calls: Vec<PlannedCall>,
}

enum PlannedCall {
    Function(ToolCallRequest),
    Unsupported(ToolCallResult),
}

struct TurnWorker {
    guard: TurnGuard,
    transport: Arc<dyn RunTransport>,
    runner: BatchRunner,
    thread_id: String,
    cancel: CancellationToken,
    phase: Phase,
    run_id: Option<String>,
    last_status: Option<RunStatus>,
    /// Tool calls that already had a `tool_call_started` event.
    announced: HashSet<String>,
    last_message: Option<Vec<MessageContent>>,
    text_open: bool,
    usage_reported: bool,
}

impl TurnWorker {
    fn interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move the turn forward by one feed event or phase transition.
    async fn advance(&mut self) -> Result<Vec<ProgressEvent>> {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Start { assistant_id, text } => {
                match self
                    .transport
                    .start_run(&self.thread_id, &assistant_id, &text)
                    .await
                {
                    Ok(feed) => {
                        self.phase = Phase::Observe(feed);
                        Ok(Vec::new())
                    }
                    Err(err) if self.interrupted() => {
                        debug!(error = %err, "start failed after interrupt");
                        Ok(vec![ProgressEvent::TurnAborted])
                    }
                    Err(err) => Err(err),
                }
            }
            Phase::Observe(mut feed) => match feed.next().await {
                Some(Ok(event)) => {
                    self.phase = Phase::Observe(feed);
                    self.observe(event).await
                }
                Some(Err(err)) if self.interrupted() => {
                    debug!(error = %err, "feed failed after interrupt");
                    Ok(vec![ProgressEvent::TurnAborted])
                }
                Some(Err(err)) => Err(err),
                None if self.interrupted() => Ok(vec![ProgressEvent::TurnAborted]),
                None => Err(PaiprogError::protocol(
                    "run feed ended before the run reached a terminal status",
                )),
            },
            Phase::Execute(batch) => Ok(self.execute(batch).await),
            Phase::Submit { run_id, outputs } => {
                if self.interrupted() {
                    debug!(run_id = %run_id, "interrupted before submitting tool outputs");
                    return Ok(vec![ProgressEvent::TurnAborted]);
                }
                match self
                    .transport
                    .submit_tool_outputs(&self.thread_id, &run_id, outputs)
                    .await
                {
                    Ok(feed) => {
                        self.phase = Phase::Observe(feed);
                        Ok(Vec::new())
                    }
                    Err(err) if self.interrupted() => {
                        debug!(run_id = %run_id, error = %err, "submission failed after interrupt");
                        Ok(vec![ProgressEvent::TurnAborted])
                    }
                    Err(err) => Err(err),
                }
            }
            Phase::Finished => Err(PaiprogError::InvalidState(
                "turn already reached a terminal event".to_string(),
            )),
        }
    }

    async fn observe(&mut self, event: RemoteRunEvent) -> Result<Vec<ProgressEvent>> {
        let mut events = Vec::new();
        match event {
            RemoteRunEvent::Run(run) => self.observe_run(run, &mut events).await?,
            RemoteRunEvent::StepCreated { step_id } => {
                events.push(ProgressEvent::StepStarted { step_id });
            }
            RemoteRunEvent::StepCompleted { step_id, usage } => {
                events.push(ProgressEvent::StepEnded { step_id });
                self.report_usage(usage, &mut events);
            }
            RemoteRunEvent::MessageStarted => {
                self.text_open = true;
                events.push(ProgressEvent::TextStarted);
            }
            RemoteRunEvent::TextDelta(text) => {
                if !self.text_open {
                    self.text_open = true;
                    events.push(ProgressEvent::TextStarted);
                }
                events.push(ProgressEvent::TextChunk { text });
            }
            RemoteRunEvent::MessageCompleted(content) => {
                self.close_text(&mut events);
                self.last_message = Some(content);
            }
            RemoteRunEvent::ToolCallDelta {
                tool_id,
                tool_name,
                arguments,
            } => {
                if let Some(tool_name) = tool_name {
                    if self.announced.insert(tool_id.clone()) {
                        events.push(ProgressEvent::ToolCallStarted {
                            tool_id: tool_id.clone(),
                            tool_name,
                        });
                    }
                }
                if let Some(chunk) = arguments.filter(|chunk| !chunk.is_empty()) {
                    events.push(ProgressEvent::ToolCallArgumentChunk { tool_id, chunk });
                }
            }
            RemoteRunEvent::Error(message) => {
                self.close_text(&mut events);
                self.phase = Phase::Finished;
                events.push(ProgressEvent::TurnError { message });
            }
        }
        Ok(events)
    }

    async fn observe_run(&mut self, run: Run, events: &mut Vec<ProgressEvent>) -> Result<()> {
        let status = run.status()?;

        if self.run_id.as_deref() != Some(run.id.as_str()) {
            if self.run_id.is_none() {
                events.push(ProgressEvent::TurnStarted {
                    run_id: run.id.clone(),
                });
            }
            self.run_id = Some(run.id.clone());
            let owes_cancel = lock(self.guard.session()).record_run(self.guard.turn_id(), &run.id);
            if owes_cancel {
                request_cancel(self.transport.as_ref(), &self.thread_id, &run.id).await;
            }
        }

        if self.last_status != Some(status) {
            self.last_status = Some(status);
            debug!(run_id = %run.id, %status, "run status changed");
            if !status.is_settled() {
                events.push(ProgressEvent::RunStatusChanged { status });
            }
        }

        match status {
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => {}
            RunStatus::RequiresAction => {
                self.close_text(events);
                match self.plan_batch(&run, events) {
                    Ok(batch) => self.phase = Phase::Execute(batch),
                    Err(err) => {
                        warn!(run_id = %run.id, error = %err, "run requires an action that cannot be submitted");
                        self.finish(
                            ProgressEvent::TurnError {
                                message: err.to_string(),
                            },
                            events,
                        );
                    }
                }
            }
            RunStatus::Completed => {
                self.close_text(events);
                // Per-step usage already covers streamed runs.
                if !self.usage_reported {
                    self.report_usage(run.usage, events);
                }
                let terminal = self.final_message().await?;
                self.finish(terminal, events);
            }
            RunStatus::Failed => {
                let message = run
                    .last_error
                    .and_then(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown Error".to_string());
                self.close_text(events);
                self.finish(ProgressEvent::TurnError { message }, events);
            }
            RunStatus::Cancelled => {
                self.close_text(events);
                self.finish(ProgressEvent::TurnAborted, events);
            }
            RunStatus::Expired => {
                self.close_text(events);
                self.finish(ProgressEvent::TurnExpired, events);
            }
        }
        Ok(())
    }

    fn plan_batch(&mut self, run: &Run, events: &mut Vec<ProgressEvent>) -> Result<PendingBatch> {
        let action = run.required_action.as_ref().ok_or_else(|| {
            PaiprogError::protocol(format!("run {} is missing its required action", run.id))
        })?;
        if action.kind != "submit_tool_outputs" {
            return Err(PaiprogError::protocol(format!(
                "unsupported required action '{}'",
                action.kind
            )));
        }
        let calls = action
            .submit_tool_outputs
            .as_ref()
            .map(|s| s.tool_calls.as_slice())
            .unwrap_or_default();

        let mut planned = Vec::with_capacity(calls.len());
        let mut ready = Vec::new();
        for call in calls {
            match (call.kind.as_str(), &call.function) {
                ("function", Some(function)) => {
                    if self.announced.insert(call.id.clone()) {
                        events.push(ProgressEvent::ToolCallStarted {
                            tool_id: call.id.clone(),
                            tool_name: function.name.clone(),
                        });
                    }
                    ready.push(ProgressEvent::ToolCallReady {
                        tool_id: call.id.clone(),
                        tool_name: function.name.clone(),
                        arguments: function.arguments.clone(),
                    });
                    planned.push(PlannedCall::Function(ToolCallRequest::new(
                        &call.id,
                        &function.name,
                        &function.arguments,
                    )));
                }
                (kind, function) => {
                    warn!(tool_id = %call.id, kind, "unsupported tool call kind");
                    planned.push(PlannedCall::Unsupported(unsupported_call_kind(
                        &call.id,
                        kind,
                        function.as_ref().map(|f| f.name.as_str()),
                    )));
                }
            }
        }
        events.extend(ready);

        Ok(PendingBatch {
            run_id: run.id.clone(),
            calls: planned,
        })
    }

    async fn execute(&mut self, batch: PendingBatch) -> Vec<ProgressEvent> {
        let requests: Vec<ToolCallRequest> = batch
            .calls
            .iter()
            .filter_map(|call| match call {
                PlannedCall::Function(request) => Some(request.clone()),
                PlannedCall::Unsupported(_) => None,
            })
            .collect();

        let outcome = self
            .runner
            .run_batch(&requests, self.cancel.child_token())
            .await;

        let mut executed = outcome.results.into_iter();
        let results: Vec<ToolCallResult> = batch
            .calls
            .into_iter()
            .filter_map(|call| match call {
                PlannedCall::Function(_) => executed.next(),
                PlannedCall::Unsupported(result) => Some(result),
            })
            .collect();
        let all_succeeded = results.iter().all(|r| r.output.is_success());

        let outputs = results
            .iter()
            .map(|r| ToolOutputSubmission {
                tool_call_id: r.tool_id.clone(),
                output: r.output.to_submission(),
            })
            .collect();

        let mut events: Vec<ProgressEvent> = results
            .into_iter()
            .map(|r| ProgressEvent::ToolCallExecuted {
                tool_id: r.tool_id,
                tool_name: r.tool_name,
                output: r.output,
            })
            .collect();
        events.push(ProgressEvent::ToolBatchCompleted { all_succeeded });

        self.phase = Phase::Submit {
            run_id: batch.run_id,
            outputs,
        };
        events
    }

    /// Terminal event for a completed run, from its last assistant message.
    async fn final_message(&mut self) -> Result<ProgressEvent> {
        let content = match self.last_message.take() {
            Some(content) => Some(content),
            None => self.transport.latest_message(&self.thread_id).await?,
        };

        let Some(first) = content.and_then(|parts| parts.into_iter().next()) else {
            return Ok(ProgressEvent::TurnEnded {
                message: String::new(),
            });
        };
        Ok(match first.as_text() {
            Some(text) => ProgressEvent::TurnEnded {
                message: text.to_string(),
            },
            None => ProgressEvent::UnsupportedContent { kind: first.kind },
        })
    }

    fn report_usage(&mut self, usage: Option<Usage>, events: &mut Vec<ProgressEvent>) {
        if let Some(usage) = usage {
            self.usage_reported = true;
            events.push(ProgressEvent::TokenUsage {
                prompt: usage.prompt_tokens,
                completion: usage.completion_tokens,
            });
        }
    }

    fn close_text(&mut self, events: &mut Vec<ProgressEvent>) {
        if std::mem::take(&mut self.text_open) {
            events.push(ProgressEvent::TextEnded);
        }
    }

    fn finish(&mut self, terminal: ProgressEvent, events: &mut Vec<ProgressEvent>) {
        self.phase = Phase::Finished;
        events.push(terminal);
    }
}
