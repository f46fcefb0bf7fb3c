//! Google Gemini provider speaking the native generateContent API.
//!
//! Uses API-key auth (`x-goog-api-key`) against the Generative Language
//! endpoint and `streamGenerateContent?alt=sse` for token streaming. Gemini
//! has no separate reasoning channel, so this provider never emits
//! `Thinking` events.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, LlmProvider, ProviderError, Role, Usage};
use crate::stream::{parse_sse_line, LineBuffer, SseParsed, StreamEvent};

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    request_timeout: Duration,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: String, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url,
            request_timeout,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    /// Build the generateContent request body.
    ///
    /// Gemini keeps the system prompt in a separate `systemInstruction`
    /// field and names the assistant role `model`.
    fn build_body(&self, req: &ChatRequest) -> serde_json::Value {
        let mut system_parts: Vec<serde_json::Value> = Vec::new();
        let mut contents: Vec<serde_json::Value> = Vec::new();

        for m in &req.messages {
            match m.role {
                Role::System => {
                    system_parts.push(serde_json::json!({ "text": m.content }));
                }
                Role::User | Role::Assistant => {
                    let role = if m.role == Role::Assistant {
                        "model"
                    } else {
                        "user"
                    };
                    contents.push(serde_json::json!({
                        "role": role,
                        "parts": [{ "text": m.content }]
                    }));
                }
            }
        }

        let mut generation_config = serde_json::json!({
            "maxOutputTokens": req.max_tokens,
        });
        if let Some(t) = req.temperature {
            generation_config["temperature"] = serde_json::json!(t);
        }
        if req.response_format_json {
            generation_config["responseMimeType"] = serde_json::json!("application/json");
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !system_parts.is_empty() {
            body["systemInstruction"] = serde_json::json!({ "parts": system_parts });
        }

        body
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        let url = self.endpoint(&req.model);
        let body = self.build_body(req);
        let timeout_secs = self.request_timeout.as_secs();

        debug!(model = %req.model, "sending streaming request to Gemini");

        let send = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            r = tokio::time::timeout(self.request_timeout, send) => match r {
                Err(_) => return Err(ProviderError::Timeout { secs: timeout_secs }),
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => return Err(ProviderError::from_transport(e, timeout_secs)),
            },
        };

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: 5000,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini API error");
            return Err(ProviderError::from_status(status, text));
        }

        relay_gemini_stream(resp, self.request_timeout, tx, cancel).await;
        Ok(())
    }
}

/// Consume a Gemini SSE response and emit StreamEvents.
///
/// Each `data:` line carries a full GenerateContentResponse whose candidate
/// parts hold the text delta; the stream ends on connection close.
async fn relay_gemini_stream(
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
            let Ok(resp_chunk) = serde_json::from_str::<GeminiResponse>(&data) else {
                continue;
            };

            if let Some(u) = &resp_chunk.usage_metadata {
                usage = Some(Usage {
                    prompt_tokens: u.prompt_token_count,
                    completion_tokens: u.candidates_token_count,
                });
            }

            for candidate in &resp_chunk.candidates {
                for part in &candidate.content.parts {
                    if let Some(t) = &part.text {
                        if !t.is_empty()
                            && tx.send(StreamEvent::Text { text: t.clone() }).await.is_err()
                        {
                            return; // receiver dropped
                        }
                    }
                }
            }
        }
    }

    let _ = tx.send(StreamEvent::End { usage }).await;
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

#[derive(Deserialize, Default)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(
            "key".to_string(),
            "https://generativelanguage.googleapis.com".to_string(),
            Duration::from_secs(180),
        )
    }

    #[test]
    fn endpoint_targets_streaming_sse() {
        let url = provider().endpoint("gemini-2.0-flash");
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn body_separates_system_instruction_and_maps_roles() {
        let req = ChatRequest::new(
            "gemini-2.0-flash",
            vec![
                ChatMessage {
                    role: Role::System,
                    content: "be brief".to_string(),
                },
                ChatMessage {
                    role: Role::User,
                    content: "hi".to_string(),
                },
                ChatMessage {
                    role: Role::Assistant,
                    content: "hello".to_string(),
                },
            ],
        );
        let body = provider().build_body(&req);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
    }

    #[test]
    fn json_mode_sets_response_mime_type() {
        let mut req = ChatRequest::new("gemini-2.0-flash", Vec::new());
        req.response_format_json = true;
        let body = provider().build_body(&req);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn stream_chunk_parses_candidate_text() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"4"}],"role":"model"}}],"usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":1}}"#;
        let resp: GeminiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(resp.candidates[0].content.parts[0].text.as_deref(), Some("4"));
        assert_eq!(resp.usage_metadata.unwrap().candidates_token_count, 1);
    }
}
