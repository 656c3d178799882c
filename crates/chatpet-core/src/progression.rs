//! Progression updater: credits happiness for each successful chat turn.
//!
//! Only happiness moves here. Level transitions belong to the profile-edit flow.

use crate::error::ProfileError;
use crate::profile::{PetProfile, ProfileStore, MAX_HAPPINESS};
use crate::shared::{now_ms, CoreConfig, DEFAULT_ENGAGEMENT_DELTA, DEFAULT_MISSING_HAPPINESS};
use std::sync::Arc;

pub struct ProgressionUpdater {
    store: Arc<dyn ProfileStore>,
    delta: u8,
    missing_default: u8,
}

impl ProgressionUpdater {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            delta: DEFAULT_ENGAGEMENT_DELTA,
            missing_default: DEFAULT_MISSING_HAPPINESS,
        }
    }

    pub fn from_config(store: Arc<dyn ProfileStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            delta: config.engagement_delta,
            missing_default: config.missing_happiness_default.min(MAX_HAPPINESS),
        }
    }

    pub fn delta(&self) -> u8 {
        self.delta
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Credits one engagement to `user_key` and returns the stored profile.
    ///
    /// An absent profile starts from defaults with `missing_default` happiness. The
    /// read-modify-write goes through [`ProfileStore::update`], so it is atomic per key.
    pub fn on_engagement(&self, user_key: &str) -> Result<PetProfile, ProfileError> {
        let delta = self.delta;
        let missing_default = self.missing_default;
        let mut before = 0u8;

        let updated = self.store.update(user_key, &mut |current| {
            let mut profile = current.unwrap_or_else(|| PetProfile::default().with_happiness(missing_default));
            before = profile.happiness;
            profile.happiness = profile.happiness.saturating_add(delta).min(MAX_HAPPINESS);
            profile.last_saved_at_ms = now_ms();
            profile
        })?;

        tracing::info!(
            target: "chatpet::progression",
            user_key = user_key,
            before = before,
            after = updated.happiness,
            "Engagement credited: happiness {} -> {}",
            before,
            updated.happiness
        );
        Ok(updated)
    }
}
