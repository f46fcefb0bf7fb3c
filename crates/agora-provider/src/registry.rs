//! Provider registry — maps provider families to their API endpoints and
//! model catalogs, and resolves a model id to the adapter that serves it.
//!
//! Registration is static at process start: a family whose API key is not
//! present in the environment is omitted entirely, so `/models/` only ever
//! lists callable models.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::gemini::GeminiProvider;
use crate::openai::{OpenAiCompatProvider, ThinkingWire};
use crate::provider::LlmProvider;

/// Capability record for one registered model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelCard {
    pub provider_name: String,
    pub model_id: String,
    pub model_name: String,
    pub description: String,
    pub supports_thinking: bool,
    /// Always-on reasoning models — thinking cannot be switched off.
    pub thinking_locked: bool,
    pub supports_json_mode: bool,
}

/// Metadata for one registered provider family.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub base_url: String,
}

struct RegisteredModel {
    card: ModelCard,
    provider: Arc<dyn LlmProvider>,
}

/// Immutable-after-startup registry of providers and their models.
pub struct ProviderRegistry {
    models: Vec<RegisteredModel>,
    providers: Vec<ProviderInfo>,
}

impl ProviderRegistry {
    /// Build the registry from the process environment.
    pub fn from_env(request_timeout: Duration) -> Self {
        let mut registry = Self::empty();

        for family in FAMILIES {
            let Ok(api_key) = std::env::var(family.key_var) else {
                continue;
            };
            if api_key.trim().is_empty() {
                continue;
            }

            let base_url = family
                .base_var
                .and_then(|v| std::env::var(v).ok())
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| family.default_base.to_string());
            let base_url = base_url.trim_end_matches('/').to_string();

            let provider: Arc<dyn LlmProvider> = if family.name == "gemini" {
                Arc::new(GeminiProvider::new(
                    api_key,
                    base_url.clone(),
                    request_timeout,
                ))
            } else {
                Arc::new(
                    OpenAiCompatProvider::new(
                        family.name,
                        api_key,
                        base_url.clone(),
                        family.thinking_wire,
                        request_timeout,
                    )
                    .with_chat_path(family.chat_path),
                )
            };

            info!(
                provider = family.name,
                models = family.models.len(),
                "registered provider"
            );

            registry.providers.push(ProviderInfo {
                name: family.name.to_string(),
                base_url,
            });
            for spec in family.models {
                registry.models.push(RegisteredModel {
                    card: spec.card(family.name),
                    provider: Arc::clone(&provider),
                });
            }
        }

        registry
    }

    /// An empty registry. Used as the base for `from_env` and by tests that
    /// register scripted providers directly.
    pub fn empty() -> Self {
        Self {
            models: Vec::new(),
            providers: Vec::new(),
        }
    }

    /// Register a model served by an arbitrary provider instance.
    pub fn register(&mut self, card: ModelCard, provider: Arc<dyn LlmProvider>) {
        if !self.providers.iter().any(|p| p.name == card.provider_name) {
            self.providers.push(ProviderInfo {
                name: card.provider_name.clone(),
                base_url: String::new(),
            });
        }
        self.models.push(RegisteredModel { card, provider });
    }

    /// True when no provider family had a usable API key.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve a model id to its capability card and adapter.
    pub fn resolve(&self, model_id: &str) -> Option<(&ModelCard, Arc<dyn LlmProvider>)> {
        self.models
            .iter()
            .find(|m| m.card.model_id == model_id)
            .map(|m| (&m.card, Arc::clone(&m.provider)))
    }

    pub fn cards(&self) -> impl Iterator<Item = &ModelCard> {
        self.models.iter().map(|m| &m.card)
    }

    pub fn providers(&self) -> &[ProviderInfo] {
        &self.providers
    }

    pub fn provider_info(&self, name: &str) -> Option<&ProviderInfo> {
        self.providers.iter().find(|p| p.name == name)
    }
}

// ── Static family table ──────────────────────────────────────────────────────

struct Family {
    name: &'static str,
    key_var: &'static str,
    /// Env var overriding the base URL; `None` pins the default.
    base_var: Option<&'static str>,
    /// Base URL without trailing slash.
    default_base: &'static str,
    /// Path appended to base_url for chat completions (unused by gemini).
    chat_path: &'static str,
    thinking_wire: ThinkingWire,
    models: &'static [ModelSpec],
}

struct ModelSpec {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    supports_thinking: bool,
    thinking_locked: bool,
    supports_json_mode: bool,
}

impl ModelSpec {
    fn card(&self, provider_name: &str) -> ModelCard {
        ModelCard {
            provider_name: provider_name.to_string(),
            model_id: self.id.to_string(),
            model_name: self.name.to_string(),
            description: self.description.to_string(),
            supports_thinking: self.supports_thinking,
            thinking_locked: self.thinking_locked,
            supports_json_mode: self.supports_json_mode,
        }
    }
}

const FAMILIES: &[Family] = &[
    Family {
        name: "mistral",
        key_var: "MISTRAL_API_KEY",
        base_var: None,
        default_base: "https://api.mistral.ai",
        chat_path: "/v1/chat/completions",
        thinking_wire: ThinkingWire::None,
        models: &[
            ModelSpec {
                id: "mistral-large-latest",
                name: "Mistral Large",
                description: "Flagship Mistral model for complex tasks",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
            ModelSpec {
                id: "mistral-small-latest",
                name: "Mistral Small",
                description: "Fast, cost-efficient Mistral model",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
        ],
    },
    Family {
        name: "qwen",
        key_var: "QWEN_API_KEY",
        base_var: Some("QWEN_BASE_URL"),
        default_base: "https://dashscope.aliyuncs.com/compatible-mode",
        chat_path: "/v1/chat/completions",
        thinking_wire: ThinkingWire::EnableThinking,
        models: &[
            ModelSpec {
                id: "qwen-plus",
                name: "Qwen Plus",
                description: "Balanced Qwen model with optional deep thinking",
                supports_thinking: true,
                thinking_locked: false,
                supports_json_mode: true,
            },
            ModelSpec {
                id: "qwen-turbo",
                name: "Qwen Turbo",
                description: "Fast Qwen model with optional deep thinking",
                supports_thinking: true,
                thinking_locked: false,
                supports_json_mode: true,
            },
            ModelSpec {
                id: "qwq-plus",
                name: "QwQ Plus",
                description: "Qwen reasoning model, thinking always on",
                supports_thinking: true,
                thinking_locked: true,
                supports_json_mode: false,
            },
        ],
    },
    Family {
        name: "glm",
        key_var: "GLM_API_KEY",
        base_var: Some("GLM_BASE_URL"),
        default_base: "https://open.bigmodel.cn/api/paas",
        chat_path: "/v4/chat/completions",
        thinking_wire: ThinkingWire::ThinkingObject,
        models: &[
            ModelSpec {
                id: "glm-4.5",
                name: "GLM-4.5",
                description: "Zhipu GLM flagship with togglable thinking",
                supports_thinking: true,
                thinking_locked: false,
                supports_json_mode: true,
            },
            ModelSpec {
                id: "glm-4-air",
                name: "GLM-4 Air",
                description: "Lightweight GLM chat model",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
        ],
    },
    Family {
        name: "minimax",
        key_var: "MINIMAX_API_KEY",
        base_var: Some("MINIMAX_BASE_URL"),
        default_base: "https://api.minimax.chat",
        chat_path: "/v1/text/chatcompletion_v2",
        thinking_wire: ThinkingWire::ThinkingObject,
        models: &[
            ModelSpec {
                id: "MiniMax-Text-01",
                name: "MiniMax Text 01",
                description: "General-purpose MiniMax chat model",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
            ModelSpec {
                id: "MiniMax-M1",
                name: "MiniMax M1",
                description: "MiniMax reasoning model, thinking always on",
                supports_thinking: true,
                thinking_locked: true,
                supports_json_mode: false,
            },
        ],
    },
    Family {
        name: "deepseek",
        key_var: "DEEPSEEK_API_KEY",
        base_var: Some("DEEPSEEK_BASE_URL"),
        default_base: "https://api.deepseek.com",
        chat_path: "/v1/chat/completions",
        thinking_wire: ThinkingWire::None,
        models: &[
            ModelSpec {
                id: "deepseek-chat",
                name: "DeepSeek Chat",
                description: "DeepSeek-V3 general chat model",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
            ModelSpec {
                id: "deepseek-reasoner",
                name: "DeepSeek Reasoner",
                description: "DeepSeek-R1 reasoning model, thinking always on",
                supports_thinking: true,
                thinking_locked: true,
                supports_json_mode: false,
            },
        ],
    },
    Family {
        name: "openai",
        key_var: "OPENAI_API_KEY",
        base_var: Some("OPENAI_BASE_URL"),
        default_base: "https://api.openai.com",
        chat_path: "/v1/chat/completions",
        thinking_wire: ThinkingWire::None,
        models: &[
            ModelSpec {
                id: "gpt-4o",
                name: "GPT-4o",
                description: "OpenAI flagship multimodal model",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
            ModelSpec {
                id: "gpt-4o-mini",
                name: "GPT-4o mini",
                description: "Fast, inexpensive OpenAI model",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
        ],
    },
    Family {
        name: "gemini",
        key_var: "GEMINI_API_KEY",
        base_var: Some("GEMINI_BASE_URL"),
        default_base: "https://generativelanguage.googleapis.com",
        chat_path: "",
        thinking_wire: ThinkingWire::None,
        models: &[
            ModelSpec {
                id: "gemini-2.0-flash",
                name: "Gemini 2.0 Flash",
                description: "Fast Google Gemini model",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
            ModelSpec {
                id: "gemini-1.5-pro",
                name: "Gemini 1.5 Pro",
                description: "Long-context Google Gemini model",
                supports_thinking: false,
                thinking_locked: false,
                supports_json_mode: true,
            },
        ],
    },
];
