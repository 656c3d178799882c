//! Model Router: sends the persona prompt and user message to a mock engine or the local runtime.

use crate::local_runtime::LocalRuntime;
use async_trait::async_trait;
use chatpet_core::{CoreConfig, EngineError, InferenceEngine, ModelHandle};

const ENGINE_NAME: &str = "ModelRouter";

/// Mode for LLM invocation: mock (deterministic reply, no runtime needed) or local (HTTP runtime).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmMode {
    #[default]
    Mock,
    Local,
}

impl LlmMode {
    /// Unknown values fall back to mock.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "local" | "live" => LlmMode::Local,
            _ => LlmMode::Mock,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmMode::Mock => "mock",
            LlmMode::Local => "local",
        }
    }
}

enum Backend {
    Mock,
    Local(LocalRuntime),
}

/// Routes a generate call to the mock or the local runtime.
pub struct ModelRouter {
    backend: Backend,
}

impl ModelRouter {
    pub fn mock() -> Self {
        Self {
            backend: Backend::Mock,
        }
    }

    pub fn local(runtime: LocalRuntime) -> Self {
        Self {
            backend: Backend::Local(runtime),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        match LlmMode::parse(&config.llm_mode) {
            LlmMode::Mock => Self::mock(),
            LlmMode::Local => Self::local(LocalRuntime::new(&config.engine_url, config.top_k)),
        }
    }

    pub fn mode(&self) -> LlmMode {
        match self.backend {
            Backend::Mock => LlmMode::Mock,
            Backend::Local(_) => LlmMode::Local,
        }
    }

    /// Drops the loaded model, if any. Call on shutdown.
    pub async fn release(&self) {
        if let Backend::Local(runtime) = &self.backend {
            runtime.release().await;
        }
    }

    /// Mock LLM: a deterministic reply in the pet's name that echoes the user.
    fn mock_generate(system_prompt: &str, user_text: &str) -> String {
        let name = persona_name(system_prompt).unwrap_or("your pet");
        let preview = user_text
            .trim()
            .chars()
            .take(80)
            .chain(if user_text.trim().chars().count() > 80 { "…" } else { "" }.chars())
            .collect::<String>();
        format!(
            "*{} perks up* You said \"{}\". I'm so happy you're talking with me!",
            name, preview
        )
    }
}

/// Pet name from a persona prompt of the form "You are {name}, ...".
fn persona_name(system_prompt: &str) -> Option<&str> {
    system_prompt
        .strip_prefix("You are ")
        .and_then(|rest| rest.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl InferenceEngine for ModelRouter {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn generate(
        &self,
        model: &ModelHandle,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, EngineError> {
        match &self.backend {
            Backend::Mock => Ok(Self::mock_generate(system_prompt, user_text)),
            Backend::Local(runtime) => runtime.generate(model, system_prompt, user_text).await,
        }
    }
}
