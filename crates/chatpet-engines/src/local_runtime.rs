//! HTTP client for a local Ollama-compatible model runtime.
//!
//! The model is loaded once per model path (`POST /api/show`) and reused until the path changes
//! or [`LocalRuntime::release`] is called. Replies come from `POST /api/chat` with streaming off.

use async_trait::async_trait;
use chatpet_core::{EngineError, InferenceEngine, ModelHandle};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const ENGINE_NAME: &str = "local";

#[derive(Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    top_k: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

pub struct LocalRuntime {
    client: reqwest::Client,
    base_url: String,
    top_k: u32,
    /// Path of the model the runtime has confirmed loaded.
    loaded: Mutex<Option<String>>,
}

impl LocalRuntime {
    pub fn new(base_url: impl Into<String>, top_k: u32) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            top_k,
            loaded: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn loaded_model(&self) -> Option<String> {
        self.loaded.lock().await.clone()
    }

    /// Forgets the loaded model; the next call loads it again. Returns whether one was loaded.
    pub async fn release(&self) -> bool {
        let released = self.loaded.lock().await.take();
        if let Some(path) = &released {
            tracing::info!(target: "chatpet::engine", model = %path, "Model released");
        }
        released.is_some()
    }

    /// Loads `model` unless it is already the loaded one.
    pub async fn ensure_loaded(&self, model: &ModelHandle) -> Result<(), EngineError> {
        let mut loaded = self.loaded.lock().await;
        if loaded.as_deref() == Some(model.path.as_str()) {
            return Ok(());
        }

        let url = format!("{}/api/show", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ShowRequest { model: &model.path })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                target: "chatpet::engine",
                model = %model.path,
                status = %status,
                "Model load rejected"
            );
            let reason = if status == reqwest::StatusCode::NOT_FOUND {
                "model not found".to_string()
            } else {
                format!("HTTP {}: {}", status, body.trim())
            };
            return Err(EngineError::LoadFailure {
                model: model.path.clone(),
                reason,
            });
        }

        if let Some(previous) = loaded.replace(model.path.clone()) {
            tracing::info!(target: "chatpet::engine", from = %previous, to = %model.path, "Model path changed; reloaded");
        } else {
            tracing::info!(target: "chatpet::engine", model = %model.path, url = %self.base_url, "Model loaded");
        }
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> EngineError {
    if e.is_connect() {
        EngineError::EngineUnavailable(e.to_string())
    } else {
        EngineError::RuntimeFailure(e.to_string())
    }
}

#[async_trait]
impl InferenceEngine for LocalRuntime {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn generate(
        &self,
        model: &ModelHandle,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, EngineError> {
        self.ensure_loaded(model).await?;

        let request = ChatRequest {
            model: &model.path,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            stream: false,
            options: ChatOptions { top_k: self.top_k },
        };

        tracing::debug!(
            target: "chatpet::engine",
            model = %model.path,
            prompt_len = system_prompt.len() + user_text.len(),
            "Dispatching chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::RuntimeFailure(format!(
                "HTTP {}: {}",
                status,
                body.trim()
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::RuntimeFailure(format!("unreadable reply: {}", e)))?;
        Ok(reply.message.content)
    }
}
