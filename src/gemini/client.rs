//! HTTPS client for the Generative Language REST API.
//!
//! [`GenerativeBackend`] is the seam the chat panels and live tools talk to;
//! [`GeminiClient`] is the production implementation. Long-running video
//! generation is only offered by the concrete client.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use super::sse::SseLineParser;
use super::types::{GenerateContentRequest, GenerateContentResponse, Operation, VideoRequest};
use crate::config::ApiConfig;
use crate::error::{Result, StudioError};

/// Header carrying the API key on REST calls.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// A stream of partial responses.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// Text/image generation operations used by panels and live tools.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// One-shot generation.
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    /// Streamed generation; each item is one partial response.
    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream>;
}

/// REST client bound to one API key.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client from API configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::Auth`] when no API key is configured, or
    /// [`StudioError::Vendor`] if the HTTP client cannot be built.
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let api_key = api.resolved_api_key().ok_or_else(|| {
            StudioError::Auth("no API key: set GEMINI_API_KEY or api.api_key".to_owned())
        })?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(api.connect_timeout_secs))
            .build()
            .map_err(|e| StudioError::Vendor(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    /// Client against an explicit base URL (used with mock servers).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        }
    }

    /// The key in use. Needed by the live link and video downloads.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    async fn post_json<B: serde::Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| StudioError::Vendor(format!("request failed: {e}")))?;
        check_status(response).await
    }

    /// Start a long-running video generation.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn start_video_generation(
        &self,
        model: &str,
        request: &VideoRequest,
    ) -> Result<Operation> {
        let url = self.model_url(model, "predictLongRunning");
        let response = self.post_json(&url, request).await?;
        let operation: Operation = response
            .json()
            .await
            .map_err(|e| StudioError::Vendor(format!("invalid operation body: {e}")))?;
        debug!(operation = %operation.name, "video generation started");
        Ok(operation)
    }

    /// Fetch the current state of an operation.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn get_operation(&self, name: &str) -> Result<Operation> {
        let url = format!("{}/{}", self.base_url, name.trim_start_matches('/'));
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| StudioError::Vendor(format!("operation poll failed: {e}")))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| StudioError::Vendor(format!("invalid operation body: {e}")))
    }

    /// Download a generated file. The API key is appended as the `key` query parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid or the download fails.
    pub async fn download(&self, uri: &str) -> Result<Bytes> {
        let mut url = url::Url::parse(uri)
            .map_err(|e| StudioError::Vendor(format!("invalid download uri '{uri}': {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| StudioError::Vendor(format!("download failed: {e}")))?;
        let response = check_status(response).await?;
        response
            .bytes()
            .await
            .map_err(|e| StudioError::Vendor(format!("download interrupted: {e}")))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = self.model_url(model, "generateContent");
        debug!(model, "generateContent");
        let response = self.post_json(&url, request).await?;
        response
            .json()
            .await
            .map_err(|e| StudioError::Vendor(format!("invalid response body: {e}")))
    }

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream> {
        let url = format!("{}?alt=sse", self.model_url(model, "streamGenerateContent"));
        debug!(model, "streamGenerateContent");
        let response = self.post_json(&url, request).await?;
        Ok(Box::pin(response_stream(response.bytes_stream())))
    }
}

/// Turn an error status into a [`StudioError`], passing successes through.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_http_error(status, &body))
}

/// Map an HTTP error status and body to a [`StudioError`].
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> StudioError {
    let message = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => StudioError::Auth(format!("authentication failed: {message}")),
        429 => StudioError::Vendor(format!("rate limited: {message}")),
        code => StudioError::Vendor(format!("HTTP {code}: {message}")),
    }
}

/// Vendor `error.message`, or the raw body when it is not a structured error.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

/// Decode an SSE byte stream into partial responses.
///
/// Undecodable events are skipped with a warning; a transport error is
/// yielded once and ends the stream.
fn response_stream<S>(bytes: S) -> impl Stream<Item = Result<GenerateContentResponse>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut parser = SseLineParser::new();
        let mut ready = VecDeque::new();
        loop {
            while let Some(item) = ready.pop_front() {
                yield item;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in parser.push(&chunk) {
                        enqueue_event(&mut ready, &event.data);
                    }
                }
                Some(Err(e)) => {
                    yield Err(StudioError::Vendor(format!("stream read error: {e}")));
                    break;
                }
                None => {
                    if let Some(event) = parser.flush() {
                        enqueue_event(&mut ready, &event.data);
                    }
                    while let Some(item) = ready.pop_front() {
                        yield item;
                    }
                    break;
                }
            }
        }
    }
}

fn enqueue_event(ready: &mut VecDeque<Result<GenerateContentResponse>>, data: &str) {
    if data.trim().is_empty() || data.trim() == "[DONE]" {
        return;
    }
    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(chunk) => ready.push_back(Ok(chunk)),
        Err(e) => warn!("skipping undecodable stream chunk: {e}"),
    }
}
