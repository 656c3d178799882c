//! Inference engine contract. Adapters live in `chatpet-engines`; the session only sees this trait.

use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies the model artifact to run. The path is opaque to the core and passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelHandle {
    pub path: String,
}

impl ModelHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// An on-device (or local) model runtime.
///
/// `generate` may take seconds. Callers cancel by dropping the returned future, so adapters must
/// not detach work that outlives it.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Short adapter name for logs.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        model: &ModelHandle,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, EngineError>;
}
