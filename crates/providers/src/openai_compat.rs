//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, DeepSeek, OpenRouter, Ollama, vLLM, SiliconFlow and
//! any endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - `reasoning_content` deltas from reasoning models, surfaced as
//!   reasoning frames
//! - Multimodal user turns (image references as `image_url` parts)

use async_trait::async_trait;
use futures::StreamExt;
use ragloom_config::ProviderConfig;
use ragloom_core::error::ProviderError;
use ragloom_core::message::{Message, Role};
use ragloom_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible chat-completion provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build a provider from the `[provider]` config section.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(format!("no API key for provider '{}'", config.name))
        })?;
        Self::new(&config.name, &config.api_url, api_key, config.timeout_secs)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let content = if m.images.is_empty() || m.role != Role::User {
                    ApiContent::Text(m.content.clone())
                } else {
                    let mut parts = vec![ApiContentPart::Text {
                        text: m.content.clone(),
                    }];
                    parts.extend(m.images.iter().map(|url| ApiContentPart::ImageUrl {
                        image_url: ApiImageUrl { url: url.clone() },
                    }));
                    ApiContent::Parts(parts)
                };
                ApiMessage {
                    role: m.role.as_str().to_string(),
                    content,
                }
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    async fn post(&self, body: &serde_json::Value, sse: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if sse {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(
                body["model"].as_str().unwrap_or_default().to_string(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ragloom_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let body = Self::request_body(&request, false);
        let response = self.post(&body, false).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let usage = api_response.usage.map(ApiUsage::into_usage);

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage,
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<FrameReceiver, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let body = Self::request_body(&request, true);
        let response = self.post(&body, true).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(forward_sse(response, tx, self.name.clone()));

        Ok(rx)
    }
}

/// Read the SSE body and forward parsed frames until `[DONE]`, the end of
/// the body, or the receiver going away.
///
/// Usage may arrive on any payload, so it never ends the stream by itself.
async fn forward_sse(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
    provider_name: String,
) {
    let mut byte_stream = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    loop {
        // A dropped receiver releases the request even while the body stalls
        let next = tokio::select! {
            biased;
            _ = tx.closed() => {
                debug!(provider = %provider_name, "stream receiver dropped, closing request");
                return;
            }
            next = byte_stream.next() => next,
        };

        let bytes = match next {
            Some(Ok(b)) => b,
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                    .await;
                return;
            }
            None => break,
        };

        for event in decoder.push(&bytes) {
            let data = match event {
                SseEvent::Done => {
                    let _ = tx.send(Ok(done_frame())).await;
                    return;
                }
                SseEvent::Data(data) => data,
            };

            let stream_resp = match serde_json::from_str::<StreamResponse>(&data) {
                Ok(r) => r,
                Err(e) => {
                    trace!(
                        provider = %provider_name,
                        data = %data,
                        error = %e,
                        "Ignoring unparseable SSE chunk"
                    );
                    continue;
                }
            };

            for frame in frames_from_response(stream_resp) {
                if tx.send(Ok(frame)).await.is_err() {
                    return; // receiver dropped
                }
            }
        }
    }

    // Stream ended without [DONE]
    let _ = tx.send(Ok(done_frame())).await;
}

fn done_frame() -> StreamChunk {
    StreamChunk {
        done: true,
        ..StreamChunk::default()
    }
}

/// Turn one parsed SSE payload into frames.
///
/// Usage rides on the payload's last frame. A payload with usage and no
/// text becomes a usage-only frame.
fn frames_from_response(resp: StreamResponse) -> Vec<StreamChunk> {
    let mut frames = Vec::new();

    if let Some(choice) = resp.choices.into_iter().next() {
        let delta = choice.delta;
        if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
            frames.push(StreamChunk::reasoning(reasoning));
        }
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            frames.push(StreamChunk::answer(content));
        }
    }

    if let Some(usage) = resp.usage.map(ApiUsage::into_usage) {
        match frames.last_mut() {
            Some(last) => last.usage = Some(usage),
            None => frames.push(StreamChunk {
                usage: Some(usage),
                ..StreamChunk::default()
            }),
        }
    }

    frames
}

/// Incremental `text/event-stream` line decoder.
///
/// Buffers raw bytes so a multi-byte character split across network reads
/// is decoded whole.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Data(String),
    Done,
}

impl SseDecoder {
    /// Append raw bytes and return every complete event seen so far.
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let text = String::from_utf8_lossy(&raw[..line_end]);
            let line = text.trim_end_matches('\r');

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }

        events
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` payload from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}
