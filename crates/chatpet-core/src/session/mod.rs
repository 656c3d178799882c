//! Chat session controller.
//!
//! One [`ChatSession`] per active user. It owns the observable [`LlmUiState`], runs at most one
//! turn at a time against an [`InferenceEngine`], and credits progression after a successful reply.
//!
//! Each accepted `submit` bumps a generation counter and spawns the turn on the tokio runtime. The
//! turn applies its result only if its generation is still current, so a completion that lands after
//! `cancel` (or after anything else moved the generation on) is dropped. State and generation sit
//! under one lock; completion and cancellation never interleave.

mod history;

pub use history::{ConversationHistory, HistoryMessage, Speaker};

use crate::engine::{InferenceEngine, ModelHandle};
use crate::error::{EngineError, SubmitRejected};
use crate::profile::{PetProfile, ProfileStore};
use crate::progression::ProgressionUpdater;
use crate::shared::CoreConfig;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot};
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Title of the error shown when the model answers with nothing.
pub const EMPTY_RESPONSE_TITLE: &str = "No reply";
/// Message of the error shown when the model answers with nothing.
pub const EMPTY_RESPONSE_MESSAGE: &str = "empty response";

const EVENT_CAPACITY: usize = 64;

/// What the display layer shows. Exactly one variant is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LlmUiState {
    #[default]
    Idle,
    Loading,
    /// Non-empty reply text.
    Success(String),
    Error { title: String, message: String },
}

impl LlmUiState {
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        LlmUiState::Error {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LlmUiState::Loading)
    }

    /// Lowercase variant name, for logs and wire views.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmUiState::Idle => "idle",
            LlmUiState::Loading => "loading",
            LlmUiState::Success(_) => "success",
            LlmUiState::Error { .. } => "error",
        }
    }
}

impl From<EngineError> for LlmUiState {
    fn from(e: EngineError) -> Self {
        LlmUiState::error(e.title(), e.to_string())
    }
}

/// One observed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub generation: u64,
    pub state: LlmUiState,
}

/// Who the session is for and which model it talks to.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_key: String,
    /// Cached profile used for the persona; refreshed on resume via `reset_profile`.
    pub profile: PetProfile,
    pub model: ModelHandle,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub generate_timeout: Duration,
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&CoreConfig::default())
    }
}

impl SessionConfig {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            generate_timeout: config.generate_timeout(),
            history_limit: config.history_limit,
        }
    }
}

/// Handle to an accepted turn.
#[derive(Debug)]
pub struct ChatTurn {
    pub generation: u64,
    pub turn_id: Uuid,
    done: oneshot::Receiver<LlmUiState>,
}

impl ChatTurn {
    /// Waits for the turn to end. Returns the state it applied, or `None` if it was cancelled
    /// or its result arrived stale.
    pub async fn finished(self) -> Option<LlmUiState> {
        self.done.await.ok()
    }
}

struct TurnSlot {
    state: LlmUiState,
    generation: u64,
    in_flight: Option<AbortHandle>,
}

pub struct ChatSession {
    user_key: String,
    model: ModelHandle,
    profile: RwLock<PetProfile>,
    engine: Arc<dyn InferenceEngine>,
    progression: Arc<ProgressionUpdater>,
    config: SessionConfig,
    slot: Mutex<TurnSlot>,
    history: Mutex<ConversationHistory>,
    events: broadcast::Sender<StateChange>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChatSession {
    pub fn new(
        context: SessionContext,
        engine: Arc<dyn InferenceEngine>,
        progression: Arc<ProgressionUpdater>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        tracing::info!(
            target: "chatpet::session",
            user_key = %context.user_key,
            engine = engine.name(),
            model = %context.model.path,
            "Chat session opened"
        );
        Arc::new(Self {
            user_key: context.user_key,
            model: context.model,
            profile: RwLock::new(context.profile),
            engine,
            progression,
            history: Mutex::new(ConversationHistory::new(config.history_limit)),
            config,
            slot: Mutex::new(TurnSlot {
                state: LlmUiState::Idle,
                generation: 0,
                in_flight: None,
            }),
            events,
        })
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn state(&self) -> LlmUiState {
        lock(&self.slot).state.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.slot).generation
    }

    /// Receiver for every transition from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Snapshot of the cached profile.
    pub fn profile(&self) -> PetProfile {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the cached profile. The next turn's persona uses it.
    pub fn reset_profile(&self, profile: PetProfile) {
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = profile;
    }

    /// Re-reads the cached profile from `store` (defaults if absent).
    pub fn refresh_profile(&self, store: &dyn ProfileStore) -> PetProfile {
        let profile = store.get(&self.user_key);
        self.reset_profile(profile.clone());
        profile
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    /// Starts a turn for `user_text`.
    ///
    /// Blank text and submissions while a turn is loading are refused without any transition.
    /// Must be called from within a tokio runtime.
    pub fn submit(self: &Arc<Self>, user_text: &str) -> Result<ChatTurn, SubmitRejected> {
        if user_text.trim().is_empty() {
            tracing::debug!(target: "chatpet::session", user_key = %self.user_key, "Blank message ignored");
            return Err(SubmitRejected::InvalidInput);
        }

        let mut slot = lock(&self.slot);
        if slot.state.is_loading() {
            tracing::debug!(
                target: "chatpet::session",
                user_key = %self.user_key,
                generation = slot.generation,
                "Message refused; a turn is already in flight"
            );
            return Err(SubmitRejected::Overlap);
        }

        slot.generation += 1;
        let generation = slot.generation;
        let turn_id = Uuid::new_v4();
        let persona = self.profile().persona_prompt();
        let system_prompt = lock(&self.history).contextualize(&persona);
        self.publish(&mut slot, LlmUiState::Loading);

        let (done_tx, done_rx) = oneshot::channel();
        let session = Arc::clone(self);
        let user_text = user_text.to_string();
        let task = tokio::spawn(async move {
            if let Some(state) = session.run_turn(generation, turn_id, system_prompt, user_text).await {
                let _ = done_tx.send(state);
            }
        });
        slot.in_flight = Some(task.abort_handle());

        tracing::info!(
            target: "chatpet::session",
            user_key = %self.user_key,
            generation = generation,
            turn_id = %turn_id,
            "Turn submitted"
        );
        Ok(ChatTurn {
            generation,
            turn_id,
            done: done_rx,
        })
    }

    /// Abandons the in-flight turn and returns to `Idle`. Does nothing unless `Loading`.
    ///
    /// Returns whether a turn was cancelled.
    pub fn cancel(&self) -> bool {
        let mut slot = lock(&self.slot);
        if !slot.state.is_loading() {
            return false;
        }
        slot.generation += 1;
        if let Some(task) = slot.in_flight.take() {
            task.abort();
        }
        self.publish(&mut slot, LlmUiState::Idle);
        tracing::info!(
            target: "chatpet::session",
            user_key = %self.user_key,
            generation = slot.generation,
            "Turn cancelled"
        );
        true
    }

    async fn run_turn(
        self: Arc<Self>,
        generation: u64,
        turn_id: Uuid,
        system_prompt: String,
        user_text: String,
    ) -> Option<LlmUiState> {
        let started = Instant::now();
        let call = self.engine.generate(&self.model, &system_prompt, &user_text);
        let outcome = match tokio::time::timeout(self.config.generate_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.config.generate_timeout)),
        };

        let next = match outcome {
            Ok(text) if text.trim().is_empty() => {
                LlmUiState::error(EMPTY_RESPONSE_TITLE, EMPTY_RESPONSE_MESSAGE)
            }
            Ok(text) => LlmUiState::Success(text),
            Err(e) => {
                tracing::error!(
                    target: "chatpet::session",
                    user_key = %self.user_key,
                    turn_id = %turn_id,
                    error = %e,
                    "Engine call failed"
                );
                LlmUiState::from(e)
            }
        };

        if !self.complete(generation, next.clone(), &user_text) {
            return None;
        }
        tracing::info!(
            target: "chatpet::session",
            user_key = %self.user_key,
            turn_id = %turn_id,
            outcome = next.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn finished"
        );

        if matches!(next, LlmUiState::Success(_)) {
            self.credit_engagement();
        }
        Some(next)
    }

    /// Applies a turn's result if `generation` is still current. Returns false for stale results.
    ///
    /// A successful exchange enters the history before `Success` is published, so any submit that
    /// follows the transition already sees it.
    fn complete(&self, generation: u64, next: LlmUiState, user_text: &str) -> bool {
        let mut slot = lock(&self.slot);
        if slot.generation != generation || !slot.state.is_loading() {
            tracing::debug!(
                target: "chatpet::session",
                user_key = %self.user_key,
                stale = generation,
                current = slot.generation,
                "Stale completion dropped"
            );
            return false;
        }
        slot.in_flight = None;
        if let LlmUiState::Success(reply) = &next {
            lock(&self.history).record(user_text, reply);
        }
        self.publish(&mut slot, next);
        true
    }

    fn credit_engagement(&self) {
        match self.progression.on_engagement(&self.user_key) {
            Ok(stored) => {
                let mut cached = self.profile.write().unwrap_or_else(PoisonError::into_inner);
                cached.happiness = stored.happiness;
                cached.last_saved_at_ms = stored.last_saved_at_ms;
            }
            Err(e) => {
                tracing::warn!(
                    target: "chatpet::progression",
                    user_key = %self.user_key,
                    error = %e,
                    "Could not persist engagement; reply stays visible"
                );
            }
        }
    }

    fn publish(&self, slot: &mut TurnSlot, state: LlmUiState) {
        slot.state = state.clone();
        // No subscribers is fine.
        let _ = self.events.send(StateChange {
            generation: slot.generation,
            state,
        });
    }
}
