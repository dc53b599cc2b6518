//! Shared HTTP client, Assistants headers, SSE framing and error mapping.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::PaiprogError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Whole-request timeout for calls whose body is read in one piece.
///
/// Streaming responses must not carry it: it also bounds the body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Get (or create) the shared reqwest client.
///
/// The client only bounds connection setup; callers add [`REQUEST_TIMEOUT`]
/// per request where the response is not streamed.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Bearer auth plus the `OpenAI-Beta: assistants=v2` opt-in.
pub fn assistants_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("OpenAI-Beta", HeaderValue::from_static("assistants=v2"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> PaiprogError {
    match status {
        401 | 403 => PaiprogError::Authentication(error_message(body)),
        429 => PaiprogError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => PaiprogError::api(status, error_message(body)),
    }
}

/// Pull `error.message` out of an OpenAI error body, else return the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

/// One server-sent event: optional `event:` name plus joined `data:` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE decoder fed with raw byte chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();

        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim_end_matches('\r').to_string();
            self.buffer = self.buffer[line_end + 1..].to_string();

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            if let Some(name) = line.strip_prefix("event:") {
                self.event = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }

        frames
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        self.take_frame()
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decoder_handles_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"event: thread.run.created\nda").is_empty());
        let frames = decoder.push(b"ta: {\"id\":\"run_1\"}\n\nevent: done\ndata: [DONE]\n\n");

        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: Some("thread.run.created".into()),
                    data: r#"{"id":"run_1"}"#.into(),
                },
                SseFrame {
                    event: Some("done".into()),
                    data: "[DONE]".into(),
                },
            ]
        );
    }

    #[test]
    fn decoder_skips_comments_and_flushes_tail() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b": keep-alive\r\nevent: error\r\ndata: {}\r\n").is_empty());

        assert_eq!(
            decoder.finish(),
            Some(SseFrame {
                event: Some("error".into()),
                data: "{}".into(),
            })
        );
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn status_mapping_extracts_openai_error_message() {
        let body = r#"{"error":{"message":"No thread found with id 'thread_x'."}}"#;

        match status_to_error(404, body) {
            PaiprogError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "No thread found with id 'thread_x'.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            status_to_error(401, "nope"),
            PaiprogError::Authentication(_)
        ));
        assert!(matches!(
            status_to_error(429, r#"{"error":{"retry_after":1.5}}"#),
            PaiprogError::RateLimited {
                retry_after_ms: Some(1500)
            }
        ));
    }
}
