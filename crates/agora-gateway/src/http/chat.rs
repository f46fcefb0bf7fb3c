//! Simple-mode streaming — POST /chat/stream
//!
//! Forwards one user message (plus recent history) to a single provider
//! and relays the token stream as plain UTF-8 text. No JSON framing: the
//! body is the answer, terminated by normal close.
//!
//! Provider failures before the first byte surface as a 502 JSON error;
//! failures after that close the stream with no end marker.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use agora_core::types::{MessageType, Role};
use agora_provider::provider::{ChatMessage, ChatRequest, Role as WireRole};
use agora_provider::stream::StreamEvent;
use agora_store::types::StoredMessage;
use agora_store::NewMessage;

use crate::app::AppState;
use crate::error::{provider_error_kind, ApiError};

/// Cap on history messages forwarded upstream.
const MAX_HISTORY_MESSAGES: usize = 20;

#[derive(Deserialize)]
pub struct ChatStreamRequest {
    pub message: String,
    pub conversation_id: String,
    pub model: String,
    #[serde(default)]
    pub thinking: bool,
}

/// POST /chat/stream — plain-text token stream.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let req: ChatStreamRequest =
        serde_json::from_value(raw).map_err(|e| ApiError::validation(e.to_string()))?;

    if req.message.trim().is_empty() {
        return Err(ApiError::validation("message cannot be empty"));
    }
    if req.conversation_id.trim().is_empty() {
        return Err(ApiError::validation("conversation_id cannot be empty"));
    }
    let (card, provider) = state
        .registry
        .resolve(&req.model)
        .ok_or_else(|| ApiError::validation(format!("unknown model: {}", req.model)))?;
    let thinking_enabled = card.thinking_locked || (req.thinking && card.supports_thinking);

    let stream_id = Uuid::new_v4();
    debug!(%stream_id, model = %req.model, conversation_id = %req.conversation_id, "simple stream start");

    state
        .store
        .create_or_touch(&req.conversation_id, Some(&req.model))?;
    state.store.append_message(
        &req.conversation_id,
        Role::User,
        &req.message,
        NewMessage {
            message_type: Some(MessageType::User),
            ..Default::default()
        },
    )?;

    let history = state.store.load_messages(&req.conversation_id)?;
    let chat_req = ChatRequest {
        model: req.model.clone(),
        messages: wire_history(&history),
        max_tokens: 4096,
        temperature: None,
        thinking_enabled,
        response_format_json: false,
    };

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
    {
        let stream_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = provider.stream_chat(&chat_req, tx.clone(), stream_cancel).await {
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    })
                    .await;
            }
        });
    }

    // The first event decides between a 502 JSON reply and a 200 byte stream.
    let first = match rx.recv().await {
        None => return Err(ApiError::internal("provider stream closed unexpectedly")),
        Some(StreamEvent::Error { kind, message }) => {
            return Err(ApiError {
                kind: provider_error_kind(&kind),
                detail: message,
            });
        }
        Some(event) => event,
    };

    let store = Arc::clone(&state.store);
    let conversation_id = req.conversation_id.clone();
    let model = req.model.clone();

    let body_stream = async_stream::stream! {
        // Dropping the response (client disconnect) cancels the upstream read.
        let _guard = cancel.drop_guard();
        let mut full = String::new();
        let mut next = Some(first);

        loop {
            let event = match next.take() {
                Some(event) => event,
                None => match rx.recv().await {
                    Some(event) => event,
                    None => break,
                },
            };
            match event {
                StreamEvent::Text { text } => {
                    full.push_str(&text);
                    yield Ok::<_, Infallible>(Bytes::from(text));
                }
                StreamEvent::Thinking { .. } => {}
                StreamEvent::End { usage } => {
                    if let Some(u) = usage {
                        debug!(%stream_id, prompt = u.prompt_tokens, completion = u.completion_tokens, "stream usage");
                    }
                    let persisted = store.append_message(
                        &conversation_id,
                        Role::Assistant,
                        &full,
                        NewMessage {
                            model: Some(model.clone()),
                            ..Default::default()
                        },
                    );
                    if let Err(e) = persisted {
                        warn!(%stream_id, error = %e, "failed to persist assistant message");
                    }
                    break;
                }
                StreamEvent::Error { kind, message } => {
                    // Bytes already sent: close with no end marker.
                    warn!(%stream_id, kind = %kind, message = %message, "stream failed midway");
                    break;
                }
            }
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Map stored history onto the upstream message list. Debate artifacts are
/// skipped; only the most recent messages are forwarded.
fn wire_history(history: &[StoredMessage]) -> Vec<ChatMessage> {
    let chat: Vec<ChatMessage> = history
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => WireRole::User,
                Role::Assistant => WireRole::Assistant,
                Role::System => return None,
            };
            match m.message_type {
                None | Some(MessageType::User) | Some(MessageType::FinalAnswer) => {
                    Some(ChatMessage {
                        role,
                        content: m.content.clone(),
                    })
                }
                _ => None,
            }
        })
        .collect();

    let start = chat.len().saturating_sub(MAX_HISTORY_MESSAGES);
    chat[start..].to_vec()
}
