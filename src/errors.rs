//! Typed error hierarchy for the wave orchestrator.
//!
//! Two enums cover what can leave the engine:
//! - `WaveError`: what a caller of the orchestrator can receive
//! - `StoreError`: persistence layer failures
//!
//! Agent and phase failures never appear here. They are recorded as
//! `WaveFault`s inside the `WaveOutcome` instead.

use thiserror::Error;

/// Errors surfaced to callers of `WaveOrchestrator`.
#[derive(Debug, Error)]
pub enum WaveError {
    #[error("Invalid wave context for '{wave_id}': {reason}")]
    InvalidContext { wave_id: String, reason: String },

    #[error("Wave {wave_id} not found")]
    WaveNotFound { wave_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WaveError {
    pub fn invalid_context(wave_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidContext {
            wave_id: wave_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Wave {wave_id} already exists")]
    DuplicateWave { wave_id: String },

    #[error("Wave {wave_id} not found")]
    WaveNotFound { wave_id: String },

    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Write rejected: {0}")]
    Rejected(String),
}
