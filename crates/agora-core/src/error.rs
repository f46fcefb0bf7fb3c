use serde::Serialize;
use thiserror::Error;

/// Error kinds surfaced on the HTTP boundary.
///
/// Every crate-level error (`ProviderError`, `StoreError`, `DebateError`)
/// maps into one of these before it reaches a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    ProviderAuth,
    ProviderRateLimit,
    ProviderTimeout,
    ProviderUpstream,
    MalformedLlmOutput,
    Storage,
    Internal,
}

impl ErrorKind {
    /// Wire string for JSON payloads and SSE error events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::ProviderAuth => "provider_auth",
            ErrorKind::ProviderRateLimit => "provider_rate_limit",
            ErrorKind::ProviderTimeout => "provider_timeout",
            ErrorKind::ProviderUpstream => "provider_upstream",
            ErrorKind::MalformedLlmOutput => "malformed_llm_output",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
