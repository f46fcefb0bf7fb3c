//! Conversation management endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use agora_core::types::Mode;
use agora_debate::mode::switch_mode;
use agora_debate::state::DebateConfig;
use agora_store::types::{ConversationSummary, StoredMessage};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct ListResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// GET /conversations?limit=&offset= — most recently updated first.
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let conversations = state.store.list_conversations(params.limit, params.offset)?;
    Ok(Json(ListResponse { conversations }))
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<StoredMessage>,
}

/// GET /conversations/{id} — the full ordered message sequence.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    if state.store.get(&id)?.is_none() {
        return Err(ApiError::not_found(format!("conversation not found: {id}")));
    }
    let messages = state.store.load_messages(&id)?;
    Ok(Json(MessagesResponse { messages }))
}

/// GET /conversations/{id}/info — metadata only, 404 if unknown.
pub async fn conversation_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<agora_store::types::Conversation>, ApiError> {
    let conversation = state
        .store
        .get(&id)?
        .ok_or_else(|| ApiError::not_found(format!("conversation not found: {id}")))?;
    Ok(Json(conversation))
}

/// DELETE /conversations/{id} — cascades to messages.
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete(&id)? {
        return Err(ApiError::not_found(format!("conversation not found: {id}")));
    }
    info!(conversation_id = %id, "conversation deleted");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// DELETE /conversations — remove everything.
pub async fn delete_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted_count = state.store.delete_all()?;
    info!(deleted_count, "all conversations deleted");
    Ok(Json(serde_json::json!({ "deleted_count": deleted_count })))
}

#[derive(Deserialize)]
pub struct SwitchModeRequest {
    pub target_mode: String,
    #[serde(default)]
    pub debate_config: Option<DebateConfig>,
}

#[derive(Serialize)]
pub struct SwitchModeResponse {
    pub success: bool,
    pub mode: Mode,
    pub message: String,
}

/// POST /conversations/{id}/switch-mode
pub async fn switch_mode_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<SwitchModeResponse>, ApiError> {
    let req: SwitchModeRequest =
        serde_json::from_value(raw).map_err(|e| ApiError::validation(e.to_string()))?;

    let target = Mode::parse(&req.target_mode)
        .ok_or_else(|| ApiError::validation(format!("unknown target_mode: {}", req.target_mode)))?;
    if let Some(cfg) = &req.debate_config {
        cfg.validate().map_err(ApiError::validation)?;
    }

    let outcome = switch_mode(&state.store, &id, target, req.debate_config).map_err(|e| match e {
        agora_debate::DebateError::Store(store_err) => ApiError::from(store_err),
        other => ApiError::internal(other.to_string()),
    })?;

    Ok(Json(SwitchModeResponse {
        success: true,
        mode: outcome.mode,
        message: outcome.message,
    }))
}
