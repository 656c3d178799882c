//! Sled-backed profile store: one tree, one JSON record per user key.

use super::{PetProfile, ProfileStore};
use crate::error::ProfileError;
use crate::journal::JournalBook;
use sled::Db;
use std::path::Path;

const DEFAULT_PATH: &str = "./data/chatpet_profiles";
const TREE_NAME: &str = "pet_profiles";

/// Store with a single Sled tree keyed by `pet/{user_key}`.
pub struct SledProfileStore {
    db: Db,
}

impl SledProfileStore {
    /// Opens or creates the profile DB at `./data/chatpet_profiles`.
    pub fn new() -> Result<Self, ProfileError> {
        Self::open_path(DEFAULT_PATH)
    }

    /// Opens or creates the profile DB at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn key(user_key: &str) -> String {
        format!("pet/{}", user_key)
    }

    fn tree(&self) -> Result<sled::Tree, ProfileError> {
        Ok(self.db.open_tree(TREE_NAME)?)
    }

    /// Returns all user keys with a stored profile. Order is not guaranteed.
    pub fn user_keys(&self) -> Result<Vec<String>, ProfileError> {
        let keys = self
            .tree()?
            .scan_prefix("pet/")
            .keys()
            .filter_map(|k| k.ok())
            .filter_map(|k| String::from_utf8(k.to_vec()).ok())
            .filter_map(|k| k.strip_prefix("pet/").map(str::to_string))
            .collect();
        Ok(keys)
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, user_key: &str, bytes: &[u8]) {
        self.tree()
            .unwrap()
            .insert(Self::key(user_key).as_bytes(), bytes)
            .unwrap();
    }

    /// Journal entries live in their own tree of the same DB.
    pub fn journal_book(&self) -> Result<JournalBook, ProfileError> {
        Ok(JournalBook::open(&self.db)?)
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<(), ProfileError> {
        self.db.flush()?;
        Ok(())
    }
}

impl ProfileStore for SledProfileStore {
    fn load(&self, user_key: &str) -> Result<Option<PetProfile>, ProfileError> {
        let bytes = self.tree()?.get(Self::key(user_key).as_bytes())?;
        bytes.map(|b| PetProfile::from_bytes(&b)).transpose()
    }

    fn put(&self, user_key: &str, profile: &PetProfile) -> Result<(), ProfileError> {
        let bytes = profile.to_bytes()?;
        let prev = self.tree()?.insert(Self::key(user_key).as_bytes(), bytes.as_slice())?;

        let is_update = prev.is_some();
        tracing::info!(
            target: "chatpet::profile",
            user_key = user_key,
            bytes = bytes.len(),
            action = if is_update { "UPDATE" } else { "INSERT" },
            "Profile {} for '{}' ({} bytes)",
            if is_update { "updated" } else { "inserted" },
            user_key,
            bytes.len()
        );
        Ok(())
    }

    fn update(
        &self,
        user_key: &str,
        f: &mut dyn FnMut(Option<PetProfile>) -> PetProfile,
    ) -> Result<PetProfile, ProfileError> {
        let tree = self.tree()?;
        let key = Self::key(user_key);

        // Optimistic read-modify-write; retried when another writer got in between.
        let profile = loop {
            let old = tree.get(key.as_bytes())?;
            let current = match &old {
                Some(bytes) => Some(PetProfile::from_bytes(bytes).map_err(|e| {
                    tracing::warn!(
                        target: "chatpet::profile",
                        user_key = user_key,
                        error = %e,
                        "Stored profile unreadable; left untouched"
                    );
                    e
                })?),
                None => None,
            };
            let next = f(current).clamped();
            let bytes = next.to_bytes()?;
            match tree.compare_and_swap(key.as_bytes(), old.as_ref(), Some(bytes))? {
                Ok(()) => break next,
                Err(_) => {
                    tracing::debug!(target: "chatpet::profile", user_key = user_key, "Profile changed concurrently; retrying");
                }
            }
        };

        tracing::info!(
            target: "chatpet::profile",
            user_key = user_key,
            level = profile.pet_level,
            happiness = profile.happiness,
            action = "UPDATE",
            "Profile for '{}' updated in place",
            user_key
        );
        Ok(profile)
    }
}
