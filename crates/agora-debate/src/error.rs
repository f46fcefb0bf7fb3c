use thiserror::Error;

use agora_store::StoreError;

/// Errors that abort a debate run or a mode switch.
///
/// Provider and parse failures never appear here — the orchestrator folds
/// them into failing-round artifacts and keeps going.
#[derive(Debug, Error)]
pub enum DebateError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("debate cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DebateError>;
