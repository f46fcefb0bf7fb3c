use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Per-provider-call timeout (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;
/// Whole-debate timeout (seconds).
pub const DEFAULT_DEBATE_TIMEOUT_SECS: u64 = 900;

/// Top-level config (agora.toml + AGORA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgoraConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for AgoraConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Timeout for a single upstream provider call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Timeout for a whole debate run, in seconds.
    #[serde(default = "default_debate_timeout")]
    pub debate_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            debate_timeout_secs: DEFAULT_DEBATE_TIMEOUT_SECS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    "./conversations.db".to_string()
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_debate_timeout() -> u64 {
    DEFAULT_DEBATE_TIMEOUT_SECS
}

impl AgoraConfig {
    /// Load config from a TOML file with AGORA_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./agora.toml (optional — defaults apply when absent)
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("agora.toml");

        let config: AgoraConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("AGORA_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}
