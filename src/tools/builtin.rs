//! Built-in pair-programming tools.
//!
//! Provides the file, git, shell and web tools the assistant is configured
//! with. Each tool is constructed via [`FnTool::new`] and returned as
//! `Arc<dyn Tool>`; [`all_tools`] is the static registration table.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paiprog::tools::builtin::all_tools;
//! use paiprog::tools::ToolRegistry;
//!
//! let registry = ToolRegistry::new(all_tools()).expect("unique tool names");
//! assert!(registry.lookup("readFile").is_some());
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tokio::io::AsyncWriteExt;

use crate::openai::http::{shared_client, REQUEST_TIMEOUT};
use crate::tools::tool::{FnTool, Tool, ToolContext, ToolFailure};
use crate::tools::types::{ToolOutput, ToolParameters};

const URL_CONTENT_MAX_BYTES: usize = 65_536;
const PROCESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Every built-in tool, in registration order.
pub fn all_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        read_file_tool(),
        ls_tool(),
        write_file_tool(),
        execute_command_tool(),
        append_to_file_tool(),
        get_url_content_tool(),
        create_dir_tool(),
        file_diff_tool(),
        commit_tool(),
    ]
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    let mut truncated = s[..cutoff].to_string();
    truncated.push_str("\n... (truncated)");
    truncated
}

/// Run a program without a shell and return its stdout.
///
/// A non-zero exit becomes [`ToolFailure::Process`] carrying stderr. The child
/// is killed when the turn is interrupted or the timeout elapses.
async fn run_process(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    ctx: &ToolContext,
) -> Result<String, ToolFailure> {
    let mut command = tokio::process::Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            return Err(ToolFailure::Message(format!("{program} was interrupted")));
        }
        result = tokio::time::timeout(PROCESS_TIMEOUT, command.output()) => match result {
            Ok(output) => output?,
            Err(_) => {
                return Err(ToolFailure::Message(format!(
                    "{program} timed out after {}s",
                    PROCESS_TIMEOUT.as_secs()
                )));
            }
        },
    };

    if !output.status.success() {
        return Err(ToolFailure::Process {
            program: program.to_string(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn git_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Split a command line on whitespace, keeping double-quoted runs together.
pub fn split_command_line(command: &str) -> Vec<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r#""[^"]+"|\S+"#).expect("valid token regex"));
    token
        .find_iter(command)
        .map(|m| {
            let text = m.as_str();
            text.strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .unwrap_or(text)
                .to_string()
        })
        .collect()
}

/// Create the `readFile` tool: reads a UTF-8 file, optionally numbering lines.
pub fn read_file_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "readFile",
        "Reads a file",
        ToolParameters::object()
            .string(
                "relativeFilePath",
                "The path to the file relative to the project root",
                true,
            )
            .boolean(
                "prefixWithLineNumbers",
                "Prefix each line with its line number. Use it for git patches",
                false,
            )
            .build(),
        |args, _ctx: ToolContext| async move {
            let path = args.get_str("relativeFilePath")?;
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ToolFailure::Message(format!("{path}: {e}")))?;

            let content = if args.get_bool_opt("prefixWithLineNumbers").unwrap_or(false) {
                content
                    .split('\n')
                    .enumerate()
                    .map(|(index, line)| format!("{}:{line}", index + 1))
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                content
            };

            Ok(ToolOutput::success(content))
        },
    ))
}

/// Create the `writeFile` tool: replaces a file's content, creating parent directories.
pub fn write_file_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "writeFile",
        "Write text to a file, replacing the current file's content",
        ToolParameters::object()
            .string(
                "relativeFilePath",
                "The path to the file relative to the project root",
                true,
            )
            .string("content", "The content to write to the file", true)
            .build(),
        |args, _ctx: ToolContext| async move {
            let path = args.get_str("relativeFilePath")?;
            let content = args.get_str("content")?;

            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(path, content)
                .await
                .map_err(|e| ToolFailure::Message(format!("{path}: {e}")))?;

            Ok(ToolOutput::done())
        },
    ))
}

/// Create the `appendToFile` tool.
pub fn append_to_file_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "appendToFile",
        "Appends content to the specified file",
        ToolParameters::object()
            .string(
                "relativeFilePath",
                "The path to the file relative to the project root",
                true,
            )
            .string("content", "The content to append to the file", true)
            .build(),
        |args, _ctx: ToolContext| async move {
            let path = args.get_str("relativeFilePath")?;
            let content = args.get_str("content")?;

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|e| ToolFailure::Message(format!("{path}: {e}")))?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;

            Ok(ToolOutput::done())
        },
    ))
}

/// Create the `createDir` tool.
pub fn create_dir_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "createDir",
        "Creates a directory and its parent directories if they don't exist",
        ToolParameters::object()
            .string("path", "The directory to create", true)
            .build(),
        |args, _ctx: ToolContext| async move {
            tokio::fs::create_dir_all(args.get_str("path")?).await?;
            Ok(ToolOutput::done())
        },
    ))
}

/// Create the `ls` tool: tracked, modified and untracked (non-ignored) files.
pub fn ls_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "ls",
        "List a directory's files",
        ToolParameters::object()
            .string_with_default("relativePath", "relative path to the directory", ".")
            .build(),
        |args, ctx: ToolContext| async move {
            let path = Path::new(args.get_str_opt("relativePath").unwrap_or("."));

            // Paths are reported relative to the repository root.
            let mut files = BTreeSet::new();
            for listing in [
                git_args(&["ls-files", "--full-name", "."]),
                git_args(&["ls-files", "--full-name", "-m", "."]),
                git_args(&["ls-files", "--full-name", "--others", "--exclude-standard", "."]),
            ] {
                let stdout = run_process("git", &listing, Some(path), &ctx).await?;
                files.extend(stdout.lines().filter(|l| !l.is_empty()).map(str::to_string));
            }

            Ok(ToolOutput::success(
                files.into_iter().collect::<Vec<_>>().join("\n"),
            ))
        },
    ))
}

/// Create the `executeCommand` tool: runs a program directly, without a shell.
pub fn execute_command_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "executeCommand",
        "Executes a command in a bash terminal",
        ToolParameters::object()
            .string("command", "The command line to execute", true)
            .string(
                "cwd",
                "relative path to the current directory to execute the command from",
                false,
            )
            .build(),
        |args, ctx: ToolContext| async move {
            let mut tokens = split_command_line(args.get_str("command")?).into_iter();
            let program = tokens
                .next()
                .ok_or_else(|| ToolFailure::from("command is empty"))?;
            let rest: Vec<String> = tokens.collect();
            let cwd = args.get_str_opt("cwd").map(PathBuf::from);

            let stdout = run_process(&program, &rest, cwd.as_deref(), &ctx).await?;
            Ok(ToolOutput::success(stdout))
        },
    ))
}

/// Create the `fileDiff` tool.
pub fn file_diff_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "fileDiff",
        "Reads the current diffs of a file",
        ToolParameters::object()
            .string(
                "relativeFilePath",
                "The path to the file relative to the project root",
                true,
            )
            .build(),
        |args, ctx: ToolContext| async move {
            let path = args.get_str("relativeFilePath")?;
            let diff = run_process("git", &git_args(&["--no-pager", "diff", path]), None, &ctx).await?;
            Ok(ToolOutput::success(diff))
        },
    ))
}

/// Create the `commit` tool: stages everything and commits.
pub fn commit_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "commit",
        "Adds and commits all changes to the current git repository",
        ToolParameters::object()
            .string("message", "The commit message", true)
            .build(),
        |args, ctx: ToolContext| async move {
            let message = args.get_str("message")?;
            run_process("git", &git_args(&["add", "."]), None, &ctx).await?;
            run_process("git", &git_args(&["commit", "-m", message]), None, &ctx).await?;
            Ok(ToolOutput::done())
        },
    ))
}

/// Create the `getUrlContent` tool: fetches a URL and returns its body text.
pub fn get_url_content_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "getUrlContent",
        "Fetches the content of a URL",
        ToolParameters::object()
            .string("url", "The URL to fetch", true)
            .build(),
        |args, _ctx: ToolContext| async move {
            let url = args.get_str("url")?;
            let resp = shared_client()
                .get(url)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?;
            let status = resp.status();
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp.text().await?;

            if !status.is_success() {
                return Err(ToolFailure::Message(format!(
                    "GET {url} returned status {}",
                    status.as_u16()
                )));
            }

            Ok(ToolOutput::success(serde_json::json!({
                "url": url,
                "status": status.as_u16(),
                "contentType": content_type,
                "content": truncate_utf8(&body, URL_CONTENT_MAX_BYTES),
            })))
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::arguments::ToolArguments;
    use crate::tools::executor::execute;
    use crate::tools::ToolRegistry;
    use tempfile::TempDir;

    async fn call(tool: Arc<dyn Tool>, args: serde_json::Value) -> ToolOutput {
        execute(tool.as_ref(), ToolArguments::new(args), ToolContext::default()).await
    }

    fn path_in(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn builtin_names_are_unique() {
        let registry = ToolRegistry::new(all_tools()).expect("unique names");
        assert_eq!(registry.len(), 9);
    }

    #[test]
    fn split_command_line_keeps_quoted_runs() {
        assert_eq!(
            split_command_line(r#"git commit -m "fix the build" --quiet"#),
            vec!["git", "commit", "-m", "fix the build", "--quiet"]
        );
        assert!(split_command_line("   ").is_empty());
    }

    #[tokio::test]
    async fn write_then_read_with_line_numbers() {
        let dir = TempDir::new().unwrap();
        let path = path_in(&dir, "nested/notes.txt");

        let written = call(
            write_file_tool(),
            serde_json::json!({ "relativeFilePath": path, "content": "alpha\nbeta" }),
        )
        .await;
        assert!(written.is_success());

        let read = call(
            read_file_tool(),
            serde_json::json!({ "relativeFilePath": path, "prefixWithLineNumbers": true }),
        )
        .await;
        assert_eq!(read, ToolOutput::success("1:alpha\n2:beta"));
    }

    #[tokio::test]
    async fn read_returns_large_files_whole() {
        let dir = TempDir::new().unwrap();
        let path = path_in(&dir, "large.txt");
        let content = "x".repeat(70_000);
        std::fs::write(&path, &content).unwrap();

        let read = call(read_file_tool(), serde_json::json!({ "relativeFilePath": path })).await;

        assert_eq!(read, ToolOutput::success(content));
    }

    #[tokio::test]
    async fn append_creates_and_extends_file() {
        let dir = TempDir::new().unwrap();
        let path = path_in(&dir, "log.txt");

        for chunk in ["one", "two"] {
            let output = call(
                append_to_file_tool(),
                serde_json::json!({ "relativeFilePath": path, "content": chunk }),
            )
            .await;
            assert!(output.is_success());
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "onetwo");
    }

    #[tokio::test]
    async fn read_missing_file_fails_with_path_in_error() {
        let dir = TempDir::new().unwrap();
        let path = path_in(&dir, "absent.txt");

        let output = call(read_file_tool(), serde_json::json!({ "relativeFilePath": path })).await;

        assert!(output.error().unwrap().contains("absent.txt"));
    }

    #[tokio::test]
    async fn create_dir_is_recursive() {
        let dir = TempDir::new().unwrap();
        let path = path_in(&dir, "a/b/c");

        let output = call(create_dir_tool(), serde_json::json!({ "path": path })).await;

        assert!(output.is_success());
        assert!(std::path::Path::new(&path).is_dir());
    }

    fn git(dir: &TempDir, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir.path())
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[tokio::test]
    async fn ls_merges_tracked_modified_and_untracked_files() {
        let dir = TempDir::new().unwrap();
        git(&dir, &["init", "--quiet"]);
        for (name, content) in [
            ("tracked.txt", "t"),
            ("modified.txt", "before"),
            (".gitignore", "ignored.txt\n"),
        ] {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        git(&dir, &["add", "tracked.txt", "modified.txt", ".gitignore"]);
        std::fs::write(dir.path().join("modified.txt"), "after").unwrap();
        std::fs::write(dir.path().join("untracked.txt"), "u").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "i").unwrap();

        let output = call(
            ls_tool(),
            serde_json::json!({ "relativePath": dir.path().to_string_lossy() }),
        )
        .await;

        assert_eq!(
            output,
            ToolOutput::success(".gitignore\nmodified.txt\ntracked.txt\nuntracked.txt")
        );
    }

    #[tokio::test]
    async fn ls_outside_a_repository_fails() {
        let dir = TempDir::new().unwrap();

        let output = call(
            ls_tool(),
            serde_json::json!({ "relativePath": dir.path().to_string_lossy() }),
        )
        .await;

        assert!(!output.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_command_returns_stdout() {
        let output = call(
            execute_command_tool(),
            serde_json::json!({ "command": r#"echo "hello world""# }),
        )
        .await;

        assert_eq!(output, ToolOutput::success("hello world\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_command_non_zero_exit_is_failure() {
        let output = call(execute_command_tool(), serde_json::json!({ "command": "false" })).await;

        assert!(!output.is_success());
        assert!(!output.error().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_command_honours_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let output = call(
            execute_command_tool(),
            serde_json::json!({ "command": "ls", "cwd": dir.path().to_string_lossy() }),
        )
        .await;

        match output {
            ToolOutput::Success { output } => {
                assert!(output.as_str().unwrap().contains("marker.txt"))
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_command_unknown_program_fails() {
        let output = call(
            execute_command_tool(),
            serde_json::json!({ "command": "definitely-not-a-real-binary-xyz" }),
        )
        .await;

        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn get_url_content_reports_http_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Hi</h1>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ok = call(
            get_url_content_tool(),
            serde_json::json!({ "url": format!("{}/page", server.uri()) }),
        )
        .await;
        match ok {
            ToolOutput::Success { output } => assert_eq!(output["content"], "<h1>Hi</h1>"),
            other => panic!("expected success, got {other:?}"),
        }

        let gone = call(
            get_url_content_tool(),
            serde_json::json!({ "url": format!("{}/gone", server.uri()) }),
        )
        .await;
        assert!(gone.error().unwrap().contains("404"));
    }
}
