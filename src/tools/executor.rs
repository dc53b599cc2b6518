//! Single-tool execution and failure normalisation.
//!
//! [`execute`] never fails: whatever a tool raises (an error, a failed child
//! process, an arbitrary value, a panic) is folded into
//! [`ToolOutput::Failure`] with a non-empty `error` string.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolContext, ToolFailure};
use super::types::ToolOutput;

type FailureMatcher = fn(&ToolFailure) -> Option<String>;

/// Shape matchers tried in order; the first non-empty message wins.
pub const FAILURE_MATCHERS: &[(&str, FailureMatcher)] = &[
    ("stderr", stderr_text),
    ("error", error_message),
    ("message", plain_message),
    ("fallback", stringified),
];

/// Run `tool` with validated arguments and normalise the outcome.
pub async fn execute(tool: &dyn Tool, args: ToolArguments, ctx: ToolContext) -> ToolOutput {
    let name = tool.name().to_string();
    debug!(tool_name = %name, tool_call_id = ?ctx.tool_call_id, "executing tool");

    let outcome = AssertUnwindSafe(tool.call(args, ctx)).catch_unwind().await;
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(ToolFailure::Panic(panic_message(payload.as_ref()))),
    };

    match result {
        Ok(output) => output,
        Err(failure) => {
            let output = normalize_failure(&failure);
            warn!(tool_name = %name, error = output.error().unwrap_or_default(), "tool failed");
            output
        }
    }
}

/// Fold a failure into a `ToolOutput::Failure` using [`FAILURE_MATCHERS`].
pub fn normalize_failure(failure: &ToolFailure) -> ToolOutput {
    let error = FAILURE_MATCHERS
        .iter()
        .find_map(|(_, matcher)| matcher(failure).filter(|text| !text.trim().is_empty()))
        .unwrap_or_else(|| "tool failed without a message".to_string());

    match failure {
        ToolFailure::Value(value) => ToolOutput::failure_with_output(error, value.clone()),
        ToolFailure::Process { status, .. } => {
            ToolOutput::failure_with_output(error, serde_json::json!({ "exitCode": status }))
        }
        _ => ToolOutput::failure(error),
    }
}

fn stderr_text(failure: &ToolFailure) -> Option<String> {
    match failure {
        ToolFailure::Process { stderr, .. } => Some(stderr.trim_end().to_string()),
        _ => None,
    }
}

fn error_message(failure: &ToolFailure) -> Option<String> {
    match failure {
        ToolFailure::Error(err) => Some(err.to_string()),
        _ => None,
    }
}

fn plain_message(failure: &ToolFailure) -> Option<String> {
    match failure {
        ToolFailure::Message(message) => Some(message.clone()),
        _ => None,
    }
}

fn stringified(failure: &ToolFailure) -> Option<String> {
    let text = match failure {
        ToolFailure::Value(serde_json::Value::String(s)) => s.clone(),
        ToolFailure::Value(value) => value.to_string(),
        ToolFailure::Panic(message) => format!("tool panicked: {message}"),
        ToolFailure::Process {
            program,
            status: Some(code),
            ..
        } => format!("{program} exited with status {code}"),
        ToolFailure::Process { program, .. } => format!("{program} was terminated by a signal"),
        ToolFailure::Message(_) | ToolFailure::Error(_) => return None,
    };
    Some(text)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool::FnTool;
    use crate::tools::types::ToolParameters;

    fn failing_tool(make: fn() -> ToolFailure) -> FnTool {
        FnTool::new(
            "flaky",
            "always fails",
            ToolParameters::empty(),
            move |_args, _ctx| async move { Err(make()) },
        )
    }

    async fn run(tool: &FnTool) -> ToolOutput {
        execute(tool, ToolArguments::new(serde_json::json!({})), ToolContext::default()).await
    }

    fn error_of(output: &ToolOutput) -> &str {
        output.error().expect("expected a failure")
    }

    #[tokio::test]
    async fn string_failure_keeps_its_text() {
        let output = run(&failing_tool(|| ToolFailure::from("disk full"))).await;

        assert_eq!(error_of(&output), "disk full");
    }

    #[tokio::test]
    async fn structured_error_uses_its_message() {
        let output = run(&failing_tool(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into()
        }))
        .await;

        assert_eq!(error_of(&output), "no such file");
    }

    #[tokio::test]
    async fn process_failure_prefers_stderr() {
        let output = run(&failing_tool(|| ToolFailure::Process {
            program: "git".into(),
            status: Some(128),
            stderr: "fatal: not a git repository\n".into(),
        }))
        .await;

        assert_eq!(error_of(&output), "fatal: not a git repository");
    }

    #[tokio::test]
    async fn process_failure_without_stderr_falls_through_to_status() {
        let output = run(&failing_tool(|| ToolFailure::Process {
            program: "false".into(),
            status: Some(1),
            stderr: String::new(),
        }))
        .await;

        assert_eq!(error_of(&output), "false exited with status 1");
    }

    #[tokio::test]
    async fn arbitrary_value_is_stringified_and_kept_as_output() {
        let output = run(&failing_tool(|| {
            ToolFailure::Value(serde_json::json!({ "code": 7 }))
        }))
        .await;

        assert_eq!(error_of(&output), r#"{"code":7}"#);
        assert!(matches!(output, ToolOutput::Failure { output: Some(_), .. }));
    }

    #[tokio::test]
    async fn empty_message_still_yields_non_empty_error() {
        let output = run(&failing_tool(|| ToolFailure::from(""))).await;

        assert_eq!(error_of(&output), "tool failed without a message");
    }

    #[tokio::test]
    async fn panicking_tool_resolves_to_failure() {
        let tool = FnTool::new(
            "explode",
            "panics",
            ToolParameters::empty(),
            |_args, _ctx| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(ToolOutput::done())
            },
        );

        let output = run(&tool).await;

        assert_eq!(error_of(&output), "tool panicked: kaboom");
    }

    #[tokio::test]
    async fn success_passes_through_untouched() {
        let tool = FnTool::new("ok", "succeeds", ToolParameters::empty(), |_args, _ctx| async {
            Ok(ToolOutput::success("fine"))
        });

        assert_eq!(run(&tool).await, ToolOutput::success("fine"));
    }
}
