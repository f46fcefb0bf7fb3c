use std::sync::Arc;

use agora_core::config::AgoraConfig;
use agora_provider::registry::ProviderRegistry;
use agora_store::ConversationStore;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: AgoraConfig,
    pub registry: Arc<ProviderRegistry>,
    pub store: Arc<ConversationStore>,
}

impl AppState {
    pub fn new(
        config: AgoraConfig,
        registry: Arc<ProviderRegistry>,
        store: Arc<ConversationStore>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/models/", get(crate::http::models::list_models))
        .route(
            "/models/providers/{name}",
            get(crate::http::models::provider_info),
        )
        .route("/chat/stream", post(crate::http::chat::chat_stream))
        .route(
            "/chat/multi-agent/stream",
            post(crate::http::debate::multi_agent_stream),
        )
        .route(
            "/conversations",
            get(crate::http::conversations::list_conversations)
                .delete(crate::http::conversations::delete_all),
        )
        .route(
            "/conversations/{id}",
            get(crate::http::conversations::get_messages)
                .delete(crate::http::conversations::delete_conversation),
        )
        .route(
            "/conversations/{id}/info",
            get(crate::http::conversations::conversation_info),
        )
        .route(
            "/conversations/{id}/switch-mode",
            post(crate::http::conversations::switch_mode_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
