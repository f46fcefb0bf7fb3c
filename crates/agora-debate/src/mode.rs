//! Conversation mode transitions.

use agora_core::types::Mode;
use agora_store::{ConversationStore, StoreError};
use tracing::info;

use crate::context::build_conversation_context;
use crate::error::Result;
use crate::state::{DebateConfig, DebateState, RoleModels, RoleThinking};

/// Result of a mode switch, echoed back to the client.
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub mode: Mode,
    pub message: String,
}

/// Switch a conversation between `simple` and `debate`.
///
/// simple → debate: builds the conversation context from existing history
/// and stores it with the supplied config. Idempotent when already in
/// debate mode — the context and config are refreshed, iteration records
/// survive.
///
/// debate → simple: clears the state's `active` flag but keeps the
/// iteration records for inspection. History is untouched.
pub fn switch_mode(
    store: &ConversationStore,
    conversation_id: &str,
    target: Mode,
    config: Option<DebateConfig>,
) -> Result<SwitchOutcome> {
    let conversation = store
        .get(conversation_id)?
        .ok_or_else(|| StoreError::NotFound {
            id: conversation_id.to_string(),
        })?;

    match target {
        Mode::Debate => {
            let messages = store.load_messages(conversation_id)?;
            let context = build_conversation_context(&messages);

            let mut state = match store.read_debate_state(conversation_id)? {
                Some(value) => match DebateState::from_value(&value) {
                    Ok(mut existing) => {
                        if let Some(cfg) = config {
                            existing.apply_config(cfg);
                        } else {
                            existing.active = true;
                        }
                        existing
                    }
                    Err(_) => fresh_state(config, &conversation.model),
                },
                None => fresh_state(config, &conversation.model),
            };
            state.conversation_context = context;

            store.write_debate_state(conversation_id, &state.to_value()?)?;
            store.update_mode(conversation_id, Mode::Debate)?;
            info!(conversation_id, "switched to debate mode");

            Ok(SwitchOutcome {
                mode: Mode::Debate,
                message: "debate mode enabled, prior context carried over".to_string(),
            })
        }
        Mode::Simple => {
            if let Some(value) = store.read_debate_state(conversation_id)? {
                if let Ok(mut state) = DebateState::from_value(&value) {
                    state.active = false;
                    store.write_debate_state(conversation_id, &state.to_value()?)?;
                }
            }
            store.update_mode(conversation_id, Mode::Simple)?;
            info!(conversation_id, "switched to simple mode");

            Ok(SwitchOutcome {
                mode: Mode::Simple,
                message: "simple mode enabled, debate history retained".to_string(),
            })
        }
    }
}

/// Debate state for a conversation that never had one. Without an explicit
/// config every role is bound to the conversation's default model; the
/// multi-agent endpoint supplies real bindings when it runs.
fn fresh_state(config: Option<DebateConfig>, default_model: &Option<String>) -> DebateState {
    let config = config.unwrap_or_else(|| {
        let model = default_model.clone().unwrap_or_default();
        DebateConfig {
            models: RoleModels {
                moderator: model.clone(),
                expert: model.clone(),
                critic: model,
            },
            max_iterations: crate::state::DEFAULT_MAX_ITERATIONS,
            score_threshold: crate::state::DEFAULT_SCORE_THRESHOLD,
            thinking: RoleThinking::default(),
        }
    });
    DebateState::from_config(config, String::new())
}
