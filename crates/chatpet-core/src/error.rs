//! Error types for ChatPet core.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by an inference engine adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("The on-device model runtime is not reachable: {0}")]
    EngineUnavailable(String),

    #[error("Could not load model '{model}': {reason}")]
    LoadFailure { model: String, reason: String },

    #[error("The model did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("The model failed while generating: {0}")]
    RuntimeFailure(String),
}

impl EngineError {
    /// Short heading for the error display.
    pub fn title(&self) -> &'static str {
        match self {
            EngineError::EngineUnavailable(_) => "Model unavailable",
            EngineError::LoadFailure { .. } => "Model failed to load",
            EngineError::Timeout(_) => "Took too long",
            EngineError::RuntimeFailure(_) => "Something went wrong",
        }
    }
}

/// Failures from the pet profile store.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("profile storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("profile encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Failures while writing or reading the pet journal.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("a journal entry is already being written")]
    Busy,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("the model returned no journal text")]
    Empty,

    #[error("journal storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("journal encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Why `submit` refused a message. Neither case changes the UI state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejected {
    #[error("message is blank")]
    InvalidInput,

    #[error("a reply is already being generated")]
    Overlap,
}
