//! Conversation-context summarisation for prompt injection.

use agora_core::types::{MessageType, Role};
use agora_store::types::StoredMessage;

/// At most this many user/assistant pairs are carried into prompts.
const MAX_CONTEXT_PAIRS: usize = 5;
/// Each side of a pair is truncated to this many characters.
const MAX_MESSAGE_CHARS: usize = 500;

/// Build the `conversation_context` string from stored history.
///
/// Only plain chat traffic participates: user messages and assistant
/// final answers. Debate artifacts (system-role records) are skipped so the
/// context stays readable prose.
pub fn build_conversation_context(messages: &[StoredMessage]) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut pending_user: Option<String> = None;

    for msg in messages {
        match msg.role {
            Role::User => {
                if is_chat_traffic(msg) {
                    pending_user = Some(msg.content.clone());
                }
            }
            Role::Assistant => {
                if is_chat_traffic(msg) {
                    if let Some(user) = pending_user.take() {
                        pairs.push((user, msg.content.clone()));
                    }
                }
            }
            Role::System => {}
        }
    }

    let start = pairs.len().saturating_sub(MAX_CONTEXT_PAIRS);
    let mut out = String::new();
    for (user, assistant) in &pairs[start..] {
        out.push_str("User: ");
        out.push_str(&truncate(user));
        out.push_str("\nAssistant: ");
        out.push_str(&truncate(assistant));
        out.push_str("\n\n");
    }
    out
}

fn is_chat_traffic(msg: &StoredMessage) -> bool {
    matches!(
        msg.message_type,
        None | Some(MessageType::User) | Some(MessageType::FinalAnswer)
    )
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_MESSAGE_CHARS {
        s.to_string()
    } else {
        s.chars().take(MAX_MESSAGE_CHARS).collect()
    }
}
