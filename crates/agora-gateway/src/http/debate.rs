//! Debate-mode streaming — POST /chat/multi-agent/stream
//!
//! Runs the Moderator → Expert → Critic workflow and relays its typed
//! events as SSE `data: <json>` records. The orchestrator persists
//! artifacts as it goes; a disconnect cancels the run and keeps whatever
//! was already written.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_core::types::{MessageType, Mode, Role};
use agora_debate::context::build_conversation_context;
use agora_debate::events::DebateEvent;
use agora_debate::orchestrator::{DebateTimeouts, Orchestrator, RoleBinding};
use agora_debate::state::{DebateConfig, DebateState};
use agora_debate::DebateError;
use agora_store::NewMessage;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct MultiAgentRequest {
    pub message: String,
    pub conversation_id: String,
    #[serde(flatten)]
    pub config: DebateConfig,
}

/// POST /chat/multi-agent/stream — SSE debate event stream.
pub async fn multi_agent_stream(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, ApiError> {
    let req: MultiAgentRequest =
        serde_json::from_value(raw).map_err(|e| ApiError::validation(e.to_string()))?;

    if req.message.trim().is_empty() {
        return Err(ApiError::validation("message cannot be empty"));
    }
    if req.conversation_id.trim().is_empty() {
        return Err(ApiError::validation("conversation_id cannot be empty"));
    }
    req.config.validate().map_err(ApiError::validation)?;

    let moderator = resolve_role(&state, &req.config.models.moderator, req.config.thinking.moderator)?;
    let expert = resolve_role(&state, &req.config.models.expert, req.config.thinking.expert)?;
    let critic = resolve_role(&state, &req.config.models.critic, req.config.thinking.critic)?;

    let stream_id = Uuid::new_v4();
    info!(%stream_id, conversation_id = %req.conversation_id, "debate stream start");

    state
        .store
        .create_or_touch(&req.conversation_id, Some(&req.config.models.expert))?;
    state.store.update_mode(&req.conversation_id, Mode::Debate)?;
    state.store.append_message(
        &req.conversation_id,
        Role::User,
        &req.message,
        NewMessage {
            message_type: Some(MessageType::User),
            ..Default::default()
        },
    )?;

    // Restore prior state (keeping accumulated context), then apply the
    // request's config and rebuild the context for this turn.
    let mut debate_state = match state.store.read_debate_state(&req.conversation_id)? {
        Some(value) => match DebateState::from_value(&value) {
            Ok(mut existing) => {
                existing.apply_config(req.config.clone());
                existing
            }
            Err(e) => {
                warn!(%stream_id, error = %e, "stored debate state unreadable, starting fresh");
                DebateState::from_config(req.config.clone(), String::new())
            }
        },
        None => DebateState::from_config(req.config.clone(), String::new()),
    };
    let history = state.store.load_messages(&req.conversation_id)?;
    debate_state.conversation_context = build_conversation_context(&history);

    let orchestrator = Orchestrator::new(
        Arc::clone(&state.store),
        moderator,
        expert,
        critic,
        DebateTimeouts {
            role_call: std::time::Duration::from_secs(state.config.limits.request_timeout_secs),
            whole_debate: std::time::Duration::from_secs(state.config.limits.debate_timeout_secs),
        },
    );

    let (tx, mut rx) = mpsc::channel::<DebateEvent>(64);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let conversation_id = req.conversation_id.clone();
    let message = req.message.clone();

    tokio::spawn(async move {
        let result = orchestrator
            .run(&conversation_id, &message, &mut debate_state, &tx, &run_cancel)
            .await;
        match result {
            Ok(outcome) => {
                debug!(
                    %stream_id,
                    reason = outcome.termination_reason.as_str(),
                    iterations = outcome.total_iterations,
                    "debate finished"
                );
            }
            // Client went away — not an error.
            Err(DebateError::Cancelled) => debug!(%stream_id, "debate cancelled"),
            // Storage failures already emitted their error event.
            Err(DebateError::Store(e)) => warn!(%stream_id, error = %e, "debate aborted on storage failure"),
            Err(e) => {
                warn!(%stream_id, error = %e, "debate aborted");
                let _ = tx
                    .send(DebateEvent::Error {
                        kind: "internal".to_string(),
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    });

    let stream = async_stream::stream! {
        // Dropping the response (client disconnect) cancels the run.
        let _guard = cancel.drop_guard();
        while let Some(event) = rx.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(json));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn resolve_role(
    state: &AppState,
    model_id: &str,
    thinking_requested: bool,
) -> Result<RoleBinding, ApiError> {
    let (card, provider) = state
        .registry
        .resolve(model_id)
        .ok_or_else(|| ApiError::validation(format!("unknown model: {model_id}")))?;
    Ok(RoleBinding::new(card, provider, thinking_requested))
}
