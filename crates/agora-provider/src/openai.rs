use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, LlmProvider, ProviderError, Usage};
use crate::stream::{parse_sse_line, LineBuffer, SseParsed, StreamEvent};

/// Backoff before the single connect-failure retry.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// How a provider family expects thinking to be requested on the wire.
///
/// All families in this group deliver reasoning back the same way — a
/// `reasoning_content` field on the stream delta — but differ in how the
/// feature is switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingWire {
    /// Family has no togglable thinking (plain models, or always-on
    /// reasoner models that need no request parameter).
    None,
    /// `"enable_thinking": true` in the request body (Qwen/DashScope).
    EnableThinking,
    /// `"thinking": {"type": "enabled"}` object (GLM, MiniMax).
    ThinkingObject,
}

/// Streaming provider for OpenAI-compatible chat completion APIs.
///
/// Covers Mistral, OpenAI, DeepSeek, Qwen, GLM and MiniMax — the wire
/// format is shared; per-family differences are limited to the endpoint
/// path and the thinking request encoding.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    provider_name: String,
    api_key: String,
    base_url: String,
    /// Path appended to base_url for chat completions.
    chat_path: String,
    thinking_wire: ThinkingWire,
    request_timeout: Duration,
}

impl OpenAiCompatProvider {
    /// Create a named OpenAI-compatible provider.
    /// `base_url` should NOT include a trailing slash.
    pub fn new(
        name: impl Into<String>,
        api_key: String,
        base_url: String,
        thinking_wire: ThinkingWire,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            provider_name: name.into(),
            api_key,
            base_url,
            chat_path: "/v1/chat/completions".to_string(),
            thinking_wire,
            request_timeout,
        }
    }

    /// Override the chat completions path (some vendors omit the /v1).
    pub fn with_chat_path(mut self, chat_path: impl Into<String>) -> Self {
        self.chat_path = chat_path.into();
        self
    }

    fn build_request_body(&self, req: &ChatRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = req
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "stream": true,
        });

        if let Some(t) = req.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if req.response_format_json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if req.thinking_enabled {
            match self.thinking_wire {
                ThinkingWire::None => {}
                ThinkingWire::EnableThinking => {
                    body["enable_thinking"] = serde_json::json!(true);
                }
                ThinkingWire::ThinkingObject => {
                    body["thinking"] = serde_json::json!({"type": "enabled"});
                }
            }
        }

        body
    }

    /// Send the request, retrying once on connection failure.
    ///
    /// Retry only happens before the first response byte; once the server
    /// has answered, errors surface directly.
    async fn send_with_retry(
        &self,
        url: &str,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ProviderError> {
        let timeout_secs = self.request_timeout.as_secs();
        for attempt in 0..2 {
            let send = self
                .client
                .post(url)
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(body)
                .send();

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                r = tokio::time::timeout(self.request_timeout, send) => match r {
                    Err(_) => Err(ProviderError::Timeout { secs: timeout_secs }),
                    Ok(Ok(resp)) => Ok(resp),
                    Ok(Err(e)) if e.is_connect() && attempt == 0 => {
                        warn!(provider = %self.provider_name, error = %e, "connect failed, retrying once");
                        tokio::time::sleep(RETRY_BACKOFF).await;
                        continue;
                    }
                    Ok(Err(e)) => Err(ProviderError::from_transport(e, timeout_secs)),
                },
            };
            return result;
        }
        unreachable!("retry loop always returns within two attempts")
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        let body = self.build_request_body(req);
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(provider = %self.provider_name, model = %req.model, "sending streaming request");

        let resp = self.send_with_retry(&url, &body, &cancel).await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(provider = %self.provider_name, status, body = %text, "streaming API error");
            return Err(ProviderError::from_status(status, text));
        }

        relay_chat_stream(resp, self.request_timeout, tx, cancel).await;
        Ok(())
    }
}

/// Consume an OpenAI-format SSE response and emit StreamEvents.
///
/// Emits exactly one terminal event (`End` or `Error`) unless the receiver
/// is dropped or the token is cancelled first.
async fn relay_chat_stream(
    resp: reqwest::Response,
    timeout: Duration,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    use futures_util::StreamExt;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut usage: Option<Usage> = None;
    let mut line_buf = LineBuffer::new();
    let mut byte_stream = resp.bytes_stream();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            r = tokio::time::timeout_at(deadline, byte_stream.next()) => r,
        };

        let chunk = match next {
            Err(_) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: "timeout".to_string(),
                        message: format!("stream read timed out after {}s", timeout.as_secs()),
                    })
                    .await;
                return;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: "upstream".to_string(),
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
            Ok(Some(Ok(c))) => c,
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        for line in line_buf.push(text) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some(SseParsed::Data(data)) = parse_sse_line(line) else {
                continue;
            };

            // OpenAI signals end-of-stream with a literal `[DONE]` data value
            if data.trim() == "[DONE]" {
                let _ = tx.send(StreamEvent::End { usage }).await;
                return;
            }

            let Ok(chunk_resp) = serde_json::from_str::<StreamChunk>(&data) else {
                continue;
            };

            // usage can arrive on the final chunk
            if let Some(u) = &chunk_resp.usage {
                usage = Some(Usage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                });
            }

            for choice in &chunk_resp.choices {
                if let Some(reasoning) = &choice.delta.reasoning_content {
                    if !reasoning.is_empty()
                        && tx
                            .send(StreamEvent::Thinking {
                                text: reasoning.clone(),
                            })
                            .await
                            .is_err()
                    {
                        return; // receiver dropped
                    }
                }
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty()
                        && tx
                            .send(StreamEvent::Text {
                                text: content.clone(),
                            })
                            .await
                            .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }

    // Some vendors close the stream without a [DONE] marker.
    let _ = tx.send(StreamEvent::End { usage }).await;
}

// OpenAI streaming chunk types

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
    /// Reasoning side channel (Qwen, GLM, MiniMax, DeepSeek reasoner).
    reasoning_content: Option<String>,
}

#[derive(Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
