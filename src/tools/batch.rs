//! Concurrent execution of the tool calls requested at one run step.

use std::sync::Arc;

use futures::future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::executor;
use super::registry::ToolRegistry;
use super::tool::ToolContext;
use super::types::{ToolCallRequest, ToolCallResult, ToolOutput};
use super::validation::validate_raw_arguments;
use crate::error::ToolError;

/// Results of one batch, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<ToolCallResult>,
    /// True iff every result is a success (vacuously true when empty).
    pub all_succeeded: bool,
}

/// Fans a batch of tool calls out to the executor.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    registry: Arc<ToolRegistry>,
}

impl BatchRunner {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run every request concurrently. Never fails as a whole.
    pub async fn run_batch(
        &self,
        requests: &[ToolCallRequest],
        cancel: CancellationToken,
    ) -> BatchOutcome {
        debug!(calls = requests.len(), "running tool batch");
        let futures = requests
            .iter()
            .map(|request| self.run_one(request, cancel.child_token()));
        let results = future::join_all(futures).await;
        let all_succeeded = results.iter().all(|r| r.output.is_success());
        BatchOutcome {
            results,
            all_succeeded,
        }
    }

    async fn run_one(&self, request: &ToolCallRequest, cancel: CancellationToken) -> ToolCallResult {
        let output = match self.registry.lookup(&request.name) {
            None => ToolOutput::failure(ToolError::UnknownTool(request.name.clone()).to_string()),
            Some(tool) => match validate_raw_arguments(&request.raw_arguments, &tool.parameters().schema) {
                Err(field_errors) => validation_failure(&request.name, field_errors),
                Ok(args) => {
                    let ctx = ToolContext {
                        tool_call_id: Some(request.id.clone()),
                        cancel,
                    };
                    executor::execute(tool.as_ref(), args, ctx).await
                }
            },
        };

        ToolCallResult {
            tool_id: request.id.clone(),
            tool_name: request.name.clone(),
            output,
        }
    }
}

fn validation_failure(
    tool_name: &str,
    field_errors: Vec<super::validation::FieldError>,
) -> ToolOutput {
    let diagnostics = serde_json::json!({ "argErrors": field_errors });
    let error = ToolError::Validation {
        tool_name: tool_name.to_string(),
        field_errors,
    };
    ToolOutput::failure_with_output(error.to_string(), diagnostics)
}

/// Synthetic result for a remote call kind this client does not handle.
pub fn unsupported_call_kind(id: &str, kind: &str, name: Option<&str>) -> ToolCallResult {
    ToolCallResult {
        tool_id: id.to_string(),
        tool_name: name.unwrap_or(kind).to_string(),
        output: ToolOutput::failure(
            ToolError::UnsupportedCallKind {
                kind: kind.to_string(),
            }
            .to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::tools::tool::{FnTool, Tool, ToolFailure};
    use crate::tools::types::ToolParameters;

    fn echo_tool(calls: Arc<AtomicUsize>) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "echo",
            "Echo text",
            ToolParameters::object().string("text", "Text", true).build(),
            move |args, _ctx| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ToolOutput::success(args.get_str("text")?.to_string()))
                }
            },
        ))
    }

    fn failing_tool() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "fail",
            "Always fails",
            ToolParameters::empty(),
            |_args, _ctx| async { Err(ToolFailure::from("nope")) },
        ))
    }

    fn runner(tools: Vec<Arc<dyn Tool>>) -> BatchRunner {
        BatchRunner::new(Arc::new(ToolRegistry::new(tools).unwrap()))
    }

    #[tokio::test]
    async fn returns_one_result_per_request_tagged_by_id() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = runner(vec![echo_tool(calls.clone()), failing_tool()]);
        let requests = vec![
            ToolCallRequest::new("c1", "echo", r#"{"text":"a"}"#),
            ToolCallRequest::new("c2", "fail", "{}"),
            ToolCallRequest::new("c3", "missing", "{}"),
            ToolCallRequest::new("c4", "echo", "{}"),
        ];

        let outcome = runner.run_batch(&requests, CancellationToken::new()).await;

        let ids: Vec<_> = outcome.results.iter().map(|r| r.tool_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
        assert!(!outcome.all_succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_succeeded_aggregates_outputs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = runner(vec![echo_tool(calls), failing_tool()]);

        let both_ok = runner
            .run_batch(
                &[
                    ToolCallRequest::new("a", "echo", r#"{"text":"1"}"#),
                    ToolCallRequest::new("b", "echo", r#"{"text":"2"}"#),
                ],
                CancellationToken::new(),
            )
            .await;
        assert!(both_ok.all_succeeded);

        let mixed = runner
            .run_batch(
                &[
                    ToolCallRequest::new("a", "echo", r#"{"text":"1"}"#),
                    ToolCallRequest::new("b", "fail", "{}"),
                ],
                CancellationToken::new(),
            )
            .await;
        assert!(!mixed.all_succeeded);

        let empty = runner.run_batch(&[], CancellationToken::new()).await;
        assert!(empty.all_succeeded);
        assert!(empty.results.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_yields_unsupported_function_failure() {
        let runner = runner(vec![failing_tool()]);

        let outcome = runner
            .run_batch(
                &[ToolCallRequest::new("c3", "doesNotExist", "{}")],
                CancellationToken::new(),
            )
            .await;

        assert_eq!(
            outcome.results[0].output,
            ToolOutput::failure("Unsupported tool function doesNotExist")
        );
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = runner(vec![echo_tool(calls.clone())]);

        let outcome = runner
            .run_batch(
                &[ToolCallRequest::new("c1", "echo", r#"{"txt":"typo"}"#)],
                CancellationToken::new(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match &outcome.results[0].output {
            ToolOutput::Failure { error, output } => {
                assert_eq!(error, "Invalid arguments for function echo");
                let diagnostics = output.as_ref().expect("field diagnostics");
                assert_eq!(diagnostics["argErrors"][0]["field"], "text");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn requests_run_concurrently() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (active_c, peak_c) = (active.clone(), peak.clone());
        let slow: Arc<dyn Tool> = Arc::new(FnTool::new(
            "slow",
            "Sleeps",
            ToolParameters::empty(),
            move |_args, _ctx| {
                let (active, peak) = (active_c.clone(), peak_c.clone());
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(ToolOutput::done())
                }
            },
        ));
        let runner = runner(vec![slow]);
        let requests: Vec<_> = (0..3)
            .map(|i| ToolCallRequest::new(format!("c{i}"), "slow", "{}"))
            .collect();

        let outcome = runner.run_batch(&requests, CancellationToken::new()).await;

        assert!(outcome.all_succeeded);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsupported_kind_is_reported_as_failure() {
        let result = unsupported_call_kind("c9", "code_interpreter", None);

        assert_eq!(result.tool_name, "code_interpreter");
        assert_eq!(result.output, ToolOutput::failure("Unsupported tool call type"));
    }
}
