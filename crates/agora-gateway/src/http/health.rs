use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub models: usize,
}

/// GET /health — liveness plus which provider families are registered.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let providers = state
        .registry
        .providers()
        .iter()
        .map(|p| ProviderHealth {
            name: p.name.clone(),
            models: state
                .registry
                .cards()
                .filter(|c| c.provider_name == p.name)
                .count(),
        })
        .collect();

    Json(HealthResponse {
        status: "ok",
        providers,
    })
}
