//! Per-user chat sessions, opened lazily with the user's stored profile.

use chatpet_core::{
    ChatSession, CoreConfig, InferenceEngine, ModelHandle, ProfileStore, ProgressionUpdater,
    SessionConfig, SessionContext,
};
use dashmap::DashMap;
use std::sync::Arc;

pub(crate) struct SessionRegistry {
    sessions: DashMap<String, Arc<ChatSession>>,
    store: Arc<dyn ProfileStore>,
    engine: Arc<dyn InferenceEngine>,
    progression: Arc<ProgressionUpdater>,
    model: ModelHandle,
    session_config: SessionConfig,
}

impl SessionRegistry {
    pub(crate) fn new(
        store: Arc<dyn ProfileStore>,
        engine: Arc<dyn InferenceEngine>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            progression: Arc::new(ProgressionUpdater::from_config(Arc::clone(&store), config)),
            store,
            engine,
            model: ModelHandle::new(config.model_path.clone()),
            session_config: SessionConfig::from_config(config),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub(crate) fn get(&self, user_key: &str) -> Option<Arc<ChatSession>> {
        self.sessions.get(user_key).map(|s| Arc::clone(s.value()))
    }

    /// Existing session for `user_key`, or a new one seeded from the store.
    pub(crate) fn get_or_open(&self, user_key: &str) -> Arc<ChatSession> {
        if let Some(session) = self.get(user_key) {
            return session;
        }
        self.sessions
            .entry(user_key.to_string())
            .or_insert_with(|| {
                ChatSession::new(
                    SessionContext {
                        user_key: user_key.to_string(),
                        profile: self.store.get(user_key),
                        model: self.model.clone(),
                    },
                    Arc::clone(&self.engine),
                    Arc::clone(&self.progression),
                    self.session_config.clone(),
                )
            })
            .value()
            .clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Cancels every in-flight turn. Returns how many were cancelled.
    pub(crate) fn cancel_all(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().cancel())
            .count()
    }
}
