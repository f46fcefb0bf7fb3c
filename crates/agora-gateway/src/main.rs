use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use agora_core::config::AgoraConfig;
use agora_provider::registry::ProviderRegistry;
use agora_store::ConversationStore;

mod app;
mod error;
mod http;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path via AGORA_CONFIG > ./agora.toml > defaults
    let config_path = std::env::var("AGORA_CONFIG").ok();
    let config = AgoraConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        AgoraConfig::default()
    });

    let registry = Arc::new(ProviderRegistry::from_env(Duration::from_secs(
        config.limits.request_timeout_secs,
    )));
    if registry.is_empty() {
        error!("no provider API keys configured — set at least one of MISTRAL_API_KEY, QWEN_API_KEY, GLM_API_KEY, MINIMAX_API_KEY, DEEPSEEK_API_KEY, OPENAI_API_KEY, GEMINI_API_KEY");
        return ExitCode::from(1);
    }

    let store = match ConversationStore::open(&config.database.path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(path = %config.database.path, "failed to open conversation store: {e}");
            return ExitCode::from(1);
        }
    };

    let addr: SocketAddr = match format!("{}:{}", config.gateway.bind, config.gateway.port).parse()
    {
        Ok(a) => a,
        Err(e) => {
            error!("invalid bind address: {e}");
            return ExitCode::from(1);
        }
    };

    let state = Arc::new(app::AppState::new(config, registry, store));
    let router = app::build_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, "failed to bind: {e}");
            return ExitCode::from(2);
        }
    };
    info!("agora gateway listening on {addr}");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
