use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use agora_provider::registry::ModelCard;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelCard>,
}

/// GET /models/ — every callable model with its capability flags.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.registry.cards().cloned().collect(),
    })
}

#[derive(Serialize)]
pub struct ProviderResponse {
    pub name: String,
    pub base_url: String,
    pub supports_thinking: bool,
    pub supports_json_mode: bool,
    pub models: Vec<ModelCard>,
}

/// GET /models/providers/{name} — one provider family's metadata.
pub async fn provider_info(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProviderResponse>, ApiError> {
    let info = state
        .registry
        .provider_info(&name)
        .ok_or_else(|| ApiError::not_found(format!("unknown provider: {name}")))?;

    let models: Vec<ModelCard> = state
        .registry
        .cards()
        .filter(|c| c.provider_name == name)
        .cloned()
        .collect();

    Ok(Json(ProviderResponse {
        name: info.name.clone(),
        base_url: info.base_url.clone(),
        supports_thinking: models.iter().any(|m| m.supports_thinking),
        supports_json_mode: models.iter().any(|m| m.supports_json_mode),
        models,
    }))
}
