//! Thin async client over the Assistants API endpoints paiprog uses.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::http::{assistants_headers, shared_client, status_to_error, REQUEST_TIMEOUT};
use super::stream::{event_stream, AssistantEventStream};
use super::types::{
    Assistant, AssistantRequest, DeletionStatus, ListResponse, Message, Run, Thread,
    ToolOutputSubmission,
};
use crate::error::Result;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            retry: RetryPolicy::default(),
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Policy applied to idempotent reads.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Timeout for non-streaming calls. Streamed runs are bounded only by
    /// connection setup, since their body stays open for the whole run.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- threads & messages --

    pub async fn create_thread(&self) -> Result<Thread> {
        self.post("/threads", &serde_json::json!({})).await
    }

    pub async fn create_message(&self, thread_id: &str, text: &str) -> Result<Message> {
        self.post(
            &format!("/threads/{thread_id}/messages"),
            &serde_json::json!({ "role": "user", "content": text }),
        )
        .await
    }

    /// Most recent messages first.
    pub async fn list_messages(&self, thread_id: &str, limit: u32) -> Result<Vec<Message>> {
        let list: ListResponse<Message> = self
            .get(&format!("/threads/{thread_id}/messages?limit={limit}&order=desc"))
            .await?;
        Ok(list.data)
    }

    // -- runs --

    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        debug!(thread_id, assistant_id, "creating run");
        self.post(
            &format!("/threads/{thread_id}/runs"),
            &serde_json::json!({ "assistant_id": assistant_id }),
        )
        .await
    }

    pub async fn create_run_stream(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<AssistantEventStream> {
        debug!(thread_id, assistant_id, "creating streaming run");
        self.post_stream(
            &format!("/threads/{thread_id}/runs"),
            &serde_json::json!({ "assistant_id": assistant_id, "stream": true }),
        )
        .await
    }

    pub async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.get(&format!("/threads/{thread_id}/runs/{run_id}")).await
    }

    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run> {
        debug!(thread_id, run_id, outputs = outputs.len(), "submitting tool outputs");
        self.post(
            &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &serde_json::json!({ "tool_outputs": outputs }),
        )
        .await
    }

    pub async fn submit_tool_outputs_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<AssistantEventStream> {
        debug!(thread_id, run_id, outputs = outputs.len(), "submitting tool outputs (stream)");
        self.post_stream(
            &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &serde_json::json!({ "tool_outputs": outputs, "stream": true }),
        )
        .await
    }

    pub async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        debug!(thread_id, run_id, "cancelling run");
        self.post(
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
            &serde_json::json!({}),
        )
        .await
    }

    // -- assistants --

    pub async fn create_assistant(&self, request: &AssistantRequest) -> Result<Assistant> {
        self.post("/assistants", request).await
    }

    pub async fn update_assistant(&self, id: &str, request: &AssistantRequest) -> Result<Assistant> {
        self.post(&format!("/assistants/{id}"), request).await
    }

    pub async fn retrieve_assistant(&self, id: &str) -> Result<Assistant> {
        self.get(&format!("/assistants/{id}")).await
    }

    pub async fn list_assistants(&self) -> Result<Vec<Assistant>> {
        let list: ListResponse<Assistant> = self.get("/assistants?limit=100&order=desc").await?;
        Ok(list.data)
    }

    pub async fn delete_assistant(&self, id: &str) -> Result<DeletionStatus> {
        let url = self.url(&format!("/assistants/{id}"));
        let resp = shared_client()
            .delete(&url)
            .headers(assistants_headers(&self.api_key))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::decode(resp).await
    }

    // -- plumbing --

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let (url, api_key, timeout) = (url.as_str(), self.api_key.as_str(), self.request_timeout);
        self.retry
            .execute(|| async move {
                let resp = shared_client()
                    .get(url)
                    .headers(assistants_headers(api_key))
                    .timeout(timeout)
                    .send()
                    .await?;
                Self::decode(resp).await
            })
            .await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = shared_client()
            .post(self.url(path))
            .headers(assistants_headers(&self.api_key))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post_stream<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<AssistantEventStream> {
        let resp = shared_client()
            .post(self.url(path))
            .headers(assistants_headers(&self.api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(event_stream(resp))
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp.json().await?)
    }
}
