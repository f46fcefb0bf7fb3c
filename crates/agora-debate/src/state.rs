//! Persistent debate state, serialized inside the conversation's metadata.

use serde::{Deserialize, Serialize};

use crate::artifact::{CriticReview, ExpertAnswer, ModeratorSynthesis, SynthDecision};

pub const MIN_ITERATIONS: u32 = 1;
pub const MAX_ITERATIONS: u32 = 10;
pub const MIN_SCORE_THRESHOLD: f64 = 50.0;
pub const MAX_SCORE_THRESHOLD: f64 = 100.0;

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 80.0;

/// Model bound to each debate role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleModels {
    pub moderator: String,
    pub expert: String,
    pub critic: String,
}

/// Per-role thinking toggles. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleThinking {
    #[serde(default)]
    pub moderator: bool,
    #[serde(default)]
    pub expert: bool,
    #[serde(default)]
    pub critic: bool,
}

/// Client-supplied debate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    pub models: RoleModels,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    #[serde(default)]
    pub thinking: RoleThinking,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_score_threshold() -> f64 {
    DEFAULT_SCORE_THRESHOLD
}

impl DebateConfig {
    /// Range-check the bounded parameters.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&self.max_iterations) {
            return Err(format!(
                "max_iterations must be in {MIN_ITERATIONS}..={MAX_ITERATIONS}, got {}",
                self.max_iterations
            ));
        }
        if !(MIN_SCORE_THRESHOLD..=MAX_SCORE_THRESHOLD).contains(&self.score_threshold) {
            return Err(format!(
                "score_threshold must be in {MIN_SCORE_THRESHOLD}..={MAX_SCORE_THRESHOLD}, got {}",
                self.score_threshold
            ));
        }
        Ok(())
    }
}

/// One completed Expert → Critic → Moderator cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub expert: ExpertAnswer,
    pub critic: CriticReview,
    pub synthesis: ModeratorSynthesis,
    pub overall_score: f64,
    pub decision: SynthDecision,
}

/// The debate orchestrator's durable state for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateState {
    pub models: RoleModels,
    pub max_iterations: u32,
    pub score_threshold: f64,
    #[serde(default)]
    pub thinking: RoleThinking,
    /// Records of the most recent debate run.
    #[serde(default)]
    pub iterations: Vec<IterationRecord>,
    /// Summarised prior turns injected into Moderator/Expert prompts.
    #[serde(default)]
    pub conversation_context: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl DebateState {
    pub fn from_config(config: DebateConfig, conversation_context: String) -> Self {
        Self {
            models: config.models,
            max_iterations: config.max_iterations,
            score_threshold: config.score_threshold,
            thinking: config.thinking,
            iterations: Vec::new(),
            conversation_context,
            active: true,
        }
    }

    /// Apply a fresh client config on top of restored state, keeping the
    /// accumulated conversation context.
    pub fn apply_config(&mut self, config: DebateConfig) {
        self.models = config.models;
        self.max_iterations = config.max_iterations;
        self.score_threshold = config.score_threshold;
        self.thinking = config.thinking;
        self.active = true;
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: &serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}
