use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::stream::StreamEvent;

/// A single message in the upstream chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Request to an LLM provider.
///
/// `thinking_enabled` and `response_format_json` are capability requests —
/// adapters ignore them for models that do not support the capability.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub thinking_enabled: bool,
    pub response_format_json: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: 4096,
            temperature: None,
            thinking_enabled: false,
            response_format_json: false,
        }
    }
}

/// Token usage reported by a provider on stream end, when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Common interface for all LLM providers.
///
/// Contract:
///   - text chunks arrive in order; their concatenation equals the final
///     assistant content
///   - exactly one terminal event (`End` or `Error`) is emitted; partial
///     text already sent is never retracted
///   - cancellation via `cancel` closes the upstream read promptly
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider family name for logging and the /health report.
    fn name(&self) -> &str;

    /// Stream a chat completion, emitting events through `tx`.
    ///
    /// An `Err` return means the request failed before any event could be
    /// emitted; callers surface it as a single `Error` event.
    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Common kind string shared with the gateway error surface.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Auth(_) => "auth",
            ProviderError::RateLimited { .. } => "rate_limit",
            ProviderError::BadRequest(_) => "bad_request",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Upstream { .. } => "upstream",
            ProviderError::MalformedResponse(_) => "malformed_response",
            ProviderError::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code into a provider error.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth(message),
            400 | 404 | 422 => ProviderError::BadRequest(message),
            _ => ProviderError::Upstream { status, message },
        }
    }

    /// Classify a transport error from reqwest.
    pub fn from_transport(e: reqwest::Error, timeout_secs: u64) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout { secs: timeout_secs }
        } else {
            ProviderError::Upstream {
                status: 0,
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_covers_the_common_set() {
        assert_eq!(ProviderError::Auth("x".into()).kind(), "auth");
        assert_eq!(
            ProviderError::RateLimited { retry_after_ms: 0 }.kind(),
            "rate_limit"
        );
        assert_eq!(ProviderError::BadRequest("x".into()).kind(), "bad_request");
        assert_eq!(ProviderError::Timeout { secs: 1 }.kind(), "timeout");
        assert_eq!(
            ProviderError::Upstream {
                status: 500,
                message: "x".into()
            }
            .kind(),
            "upstream"
        );
        assert_eq!(
            ProviderError::MalformedResponse("x".into()).kind(),
            "malformed_response"
        );
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            ProviderError::from_status(401, String::new()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(403, String::new()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(422, String::new()),
            ProviderError::BadRequest(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, String::new()),
            ProviderError::Upstream { status: 500, .. }
        ));
    }
}
