//! How the driver talks to the remote run: streaming or polling.
//!
//! Both strategies surface the same [`RemoteRunEvent`] feed, so the driver
//! reconciles run state in one place regardless of how updates arrive.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use crate::error::Result;
use crate::openai::stream::{AssistantEventStream, AssistantStreamEvent};
use crate::openai::types::{MessageContent, Run, ToolOutputSubmission, Usage};
use crate::openai::OpenAiClient;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One observation of the remote run.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteRunEvent {
    /// A run snapshot carrying its current status.
    Run(Run),
    StepCreated {
        step_id: String,
    },
    StepCompleted {
        step_id: String,
        usage: Option<Usage>,
    },
    MessageStarted,
    TextDelta(String),
    MessageCompleted(Vec<MessageContent>),
    /// Incremental tool call data; the name is present on the first delta.
    ToolCallDelta {
        tool_id: String,
        tool_name: Option<String>,
        arguments: Option<String>,
    },
    /// The remote reported an error outside a run snapshot.
    Error(String),
}

/// Finite feed of remote events for one segment of a run.
pub type RunFeed = BoxStream<'static, Result<RemoteRunEvent>>;

#[async_trait]
pub trait RunTransport: Send + Sync {
    /// Post the user message and start a run on the thread.
    async fn start_run(&self, thread_id: &str, assistant_id: &str, text: &str) -> Result<RunFeed>;

    /// Submit tool outputs and continue observing the run.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutputSubmission>,
    ) -> Result<RunFeed>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    /// Content of the newest message on the thread.
    async fn latest_message(&self, thread_id: &str) -> Result<Option<Vec<MessageContent>>>;
}

async fn newest_message_content(
    client: &OpenAiClient,
    thread_id: &str,
) -> Result<Option<Vec<MessageContent>>> {
    let messages = client.list_messages(thread_id, 1).await?;
    Ok(messages.into_iter().next().map(|m| m.content))
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Observes runs through `stream: true` server-sent events.
#[derive(Debug, Clone)]
pub struct StreamingTransport {
    client: OpenAiClient,
}

impl StreamingTransport {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RunTransport for StreamingTransport {
    async fn start_run(&self, thread_id: &str, assistant_id: &str, text: &str) -> Result<RunFeed> {
        self.client.create_message(thread_id, text).await?;
        let events = self.client.create_run_stream(thread_id, assistant_id).await?;
        Ok(stream_feed(events))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutputSubmission>,
    ) -> Result<RunFeed> {
        let events = self
            .client
            .submit_tool_outputs_stream(thread_id, run_id, &outputs)
            .await?;
        Ok(stream_feed(events))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        self.client.cancel_run(thread_id, run_id).await.map(|_| ())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<Option<Vec<MessageContent>>> {
        newest_message_content(&self.client, thread_id).await
    }
}

/// Map assistant stream events onto the run feed.
///
/// Tool call deltas only carry their id on the first fragment; later
/// fragments are matched by `(step id, index)`.
pub fn stream_feed(events: AssistantEventStream) -> RunFeed {
    let feed = async_stream::try_stream! {
        let mut call_ids: HashMap<(String, usize), String> = HashMap::new();
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            match event? {
                AssistantStreamEvent::Done => break,
                AssistantStreamEvent::Run(run) => {
                    yield RemoteRunEvent::Run(run);
                }
                AssistantStreamEvent::StepCreated(step) => {
                    yield RemoteRunEvent::StepCreated { step_id: step.id };
                }
                AssistantStreamEvent::StepCompleted(step) => {
                    yield RemoteRunEvent::StepCompleted { step_id: step.id, usage: step.usage };
                }
                AssistantStreamEvent::StepDelta(delta) => {
                    let calls = delta
                        .delta
                        .step_details
                        .map(|details| details.tool_calls)
                        .unwrap_or_default();
                    for call in calls {
                        let key = (delta.id.clone(), call.index);
                        if let Some(id) = call.id {
                            call_ids.insert(key.clone(), id);
                        }
                        let (Some(tool_id), Some(function)) = (call_ids.get(&key), call.function) else {
                            continue;
                        };
                        yield RemoteRunEvent::ToolCallDelta {
                            tool_id: tool_id.clone(),
                            tool_name: function.name,
                            arguments: function.arguments,
                        };
                    }
                }
                AssistantStreamEvent::MessageCreated(_) => {
                    yield RemoteRunEvent::MessageStarted;
                }
                AssistantStreamEvent::MessageDelta(delta) => {
                    for part in delta.delta.content {
                        if let Some(text) = part.text.and_then(|t| t.value) {
                            yield RemoteRunEvent::TextDelta(text);
                        }
                    }
                }
                AssistantStreamEvent::MessageCompleted(message) => {
                    yield RemoteRunEvent::MessageCompleted(message.content);
                }
                AssistantStreamEvent::Error(err) => {
                    yield RemoteRunEvent::Error(
                        err.message.unwrap_or_else(|| "Unknown Error".to_string()),
                    );
                }
            }
        }
    };

    Box::pin(feed)
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Observes runs by retrieving them on a fixed interval.
#[derive(Debug, Clone)]
pub struct PollingTransport {
    client: OpenAiClient,
    interval: Duration,
}

impl PollingTransport {
    pub fn new(client: OpenAiClient) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl RunTransport for PollingTransport {
    async fn start_run(&self, thread_id: &str, assistant_id: &str, text: &str) -> Result<RunFeed> {
        self.client.create_message(thread_id, text).await?;
        let run = self.client.create_run(thread_id, assistant_id).await?;
        Ok(poll_feed(self.client.clone(), thread_id.to_string(), run, self.interval))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutputSubmission>,
    ) -> Result<RunFeed> {
        let run = self
            .client
            .submit_tool_outputs(thread_id, run_id, &outputs)
            .await?;
        Ok(poll_feed(self.client.clone(), thread_id.to_string(), run, self.interval))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        self.client.cancel_run(thread_id, run_id).await.map(|_| ())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<Option<Vec<MessageContent>>> {
        newest_message_content(&self.client, thread_id).await
    }
}

/// Yield `run`, then a fresh snapshot every `interval` until it settles.
///
/// Unknown statuses count as settled so the driver can reject them.
fn poll_feed(client: OpenAiClient, thread_id: String, run: Run, interval: Duration) -> RunFeed {
    let feed = async_stream::try_stream! {
        let mut run = run;
        loop {
            let settled = run.status().map(|s| s.is_settled()).unwrap_or(true);
            let run_id = run.id.clone();
            yield RemoteRunEvent::Run(run);
            if settled {
                break;
            }
            tokio::time::sleep(interval).await;
            debug!(thread_id = %thread_id, run_id = %run_id, "polling run");
            run = client.retrieve_run(&thread_id, &run_id).await?;
        }
    };

    Box::pin(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::types::{
        FunctionCallDelta, Message, MessageContentDelta, MessageDelta, MessageDeltaBody, RunStep,
        RunStepDelta, StepDeltaBody, StepDetailsDelta, TextDelta, ToolCallDelta,
    };
    use crate::util::retry::RetryPolicy;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn run(status: &str) -> Run {
        Run {
            id: "run_1".into(),
            thread_id: "thread_1".into(),
            status: status.into(),
            required_action: None,
            last_error: None,
            usage: None,
        }
    }

    fn call_delta(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            kind: Some("function".into()),
            function: Some(FunctionCallDelta {
                name: name.map(str::to_string),
                arguments: Some(args.to_string()),
            }),
        }
    }

    fn step_delta(calls: Vec<ToolCallDelta>) -> AssistantStreamEvent {
        AssistantStreamEvent::StepDelta(RunStepDelta {
            id: "step_1".into(),
            delta: StepDeltaBody {
                step_details: Some(StepDetailsDelta {
                    kind: "tool_calls".into(),
                    tool_calls: calls,
                }),
            },
        })
    }

    #[tokio::test]
    async fn stream_feed_maps_events_and_resolves_tool_call_ids() {
        let events = vec![
            Ok(AssistantStreamEvent::Run(run("in_progress"))),
            Ok(AssistantStreamEvent::StepCreated(RunStep { id: "step_1".into(), usage: None })),
            Ok(step_delta(vec![call_delta(0, Some("call_a"), Some("ls"), "")])),
            Ok(step_delta(vec![call_delta(0, None, None, "{\"relativePath\":")])),
            Ok(AssistantStreamEvent::MessageCreated(Message {
                id: "msg_1".into(),
                role: "assistant".into(),
                content: vec![],
                run_id: None,
            })),
            Ok(AssistantStreamEvent::MessageDelta(MessageDelta {
                id: "msg_1".into(),
                delta: MessageDeltaBody {
                    content: vec![MessageContentDelta {
                        index: 0,
                        kind: "text".into(),
                        text: Some(TextDelta { value: Some("Hi".into()) }),
                    }],
                },
            })),
            Ok(AssistantStreamEvent::Done),
            Ok(AssistantStreamEvent::Run(run("completed"))),
        ];

        let feed: Vec<_> = stream_feed(Box::pin(futures::stream::iter(events)))
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(
            feed,
            vec![
                RemoteRunEvent::Run(run("in_progress")),
                RemoteRunEvent::StepCreated { step_id: "step_1".into() },
                RemoteRunEvent::ToolCallDelta {
                    tool_id: "call_a".into(),
                    tool_name: Some("ls".into()),
                    arguments: Some(String::new()),
                },
                RemoteRunEvent::ToolCallDelta {
                    tool_id: "call_a".into(),
                    tool_name: None,
                    arguments: Some("{\"relativePath\":".into()),
                },
                RemoteRunEvent::MessageStarted,
                RemoteRunEvent::TextDelta("Hi".into()),
            ]
        );
    }

    #[tokio::test]
    async fn poll_feed_stops_once_run_settles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "id": "run_1", "thread_id": "thread_1", "status": "completed"
                })),
            )
            .expect(1)
            .mount(&server)
            .await;
        let client =
            OpenAiClient::new("sk-test", Some(server.uri())).with_retry_policy(RetryPolicy::none());

        let feed: Vec<_> = poll_feed(client, "thread_1".into(), run("queued"), Duration::from_millis(10))
            .collect()
            .await;

        let statuses: Vec<_> = feed
            .into_iter()
            .map(|e| match e.unwrap() {
                RemoteRunEvent::Run(run) => run.status,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(statuses, vec!["queued", "completed"]);
    }

    #[tokio::test]
    async fn poll_feed_yields_unknown_status_once_and_stops() {
        let client = OpenAiClient::new("sk-test", Some("http://127.0.0.1:9".into()));

        let feed: Vec<_> = poll_feed(client, "thread_1".into(), run("paused"), Duration::from_millis(10))
            .collect()
            .await;

        assert_eq!(feed.len(), 1);
    }
}
