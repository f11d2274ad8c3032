//! Error types for Vritual

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The persisted document exists but cannot be parsed. Never auto-repaired.
    #[error("corrupt state at {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// The store could not accept or apply a mutation within its window.
    #[error("store busy: {0}")]
    StoreBusy(String),

    #[error("store closed")]
    StoreClosed,

    #[error("effect dispatch failed: {target} - {message}")]
    EffectDispatch { target: String, message: String },

    #[error("preset not found: {0}")]
    PresetNotFound(String),

    #[error("no active mission")]
    NoActiveMission,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn corrupt_state(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn effect_dispatch(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EffectDispatch {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Contention clears on its own; the next scheduled tick retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreBusy(_))
    }
}
