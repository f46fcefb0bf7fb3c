use agora_core::types::{MessageType, Mode, Role};
use serde::Serialize;

/// A persisted conversation.
///
/// `metadata` is an opaque JSON object; the debate layer keeps its
/// serialized state under the `"debate_state"` key.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub model: Option<String>,
    pub mode: Mode,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: u32,
    pub title: Option<String>,
    pub metadata: serde_json::Value,
}

/// One stored message, ordered by `seq` within its conversation.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub seq: i64,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Listing row for `GET /conversations`.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub updated_at: String,
    pub mode: Mode,
    pub message_count: u32,
}
