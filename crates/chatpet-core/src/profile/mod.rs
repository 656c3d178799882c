//! Pet profiles: the durable per-user record the chat session reads and the progression updater writes.

mod store;

pub use store::SledProfileStore;

use crate::error::ProfileError;
use crate::shared::{now_ms, PetType, DEFAULT_MISSING_HAPPINESS, DEFAULT_PET_NAME};
use serde::{Deserialize, Deserializer, Serialize};

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 3;
pub const MAX_HAPPINESS: u8 = 100;

/// Attributes of one user's pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetProfile {
    pub pet_type: PetType,
    pub pet_name: String,
    /// 1..=3; out-of-range stored values are clamped on read.
    #[serde(deserialize_with = "level_in_range")]
    pub pet_level: u8,
    /// 0..=100; out-of-range stored values are clamped on read.
    #[serde(deserialize_with = "happiness_in_range")]
    pub happiness: u8,
    /// Unix timestamp (ms) of the last mutation. Ordering only.
    #[serde(default)]
    pub last_saved_at_ms: i64,
}

/// Reads any JSON number and clamps it into `min..=max`, so a stored 300 or -5 still decodes.
fn clamped_number<'de, D: Deserializer<'de>>(d: D, min: u8, max: u8) -> Result<u8, D::Error> {
    let raw = f64::deserialize(d)?;
    Ok(raw.round().clamp(f64::from(min), f64::from(max)) as u8)
}

fn level_in_range<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    clamped_number(d, MIN_LEVEL, MAX_LEVEL)
}

fn happiness_in_range<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    clamped_number(d, 0, MAX_HAPPINESS)
}

impl Default for PetProfile {
    fn default() -> Self {
        Self {
            pet_type: PetType::default(),
            pet_name: DEFAULT_PET_NAME.to_string(),
            pet_level: MIN_LEVEL,
            happiness: DEFAULT_MISSING_HAPPINESS,
            last_saved_at_ms: now_ms(),
        }
    }
}

impl PetProfile {
    pub fn new(pet_type: PetType, pet_name: impl Into<String>) -> Self {
        let pet_name = pet_name.into();
        let pet_name = if pet_name.trim().is_empty() {
            DEFAULT_PET_NAME.to_string()
        } else {
            pet_name
        };
        Self {
            pet_type,
            pet_name,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.pet_level = level.clamp(MIN_LEVEL, MAX_LEVEL);
        self
    }

    pub fn with_happiness(mut self, happiness: u8) -> Self {
        self.happiness = happiness.min(MAX_HAPPINESS);
        self
    }

    /// Returns the profile with level and happiness forced into their declared ranges.
    pub fn clamped(mut self) -> Self {
        self.pet_level = self.pet_level.clamp(MIN_LEVEL, MAX_LEVEL);
        self.happiness = self.happiness.min(MAX_HAPPINESS);
        self
    }

    /// Persona prompt for this pet at its current level.
    pub fn persona_prompt(&self) -> String {
        crate::persona::build_persona_prompt(self.pet_type.as_str(), &self.pet_name, i64::from(self.pet_level))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProfileError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes and clamps a stored profile.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProfileError> {
        let profile: PetProfile = serde_json::from_slice(bytes)?;
        Ok(profile.clamped())
    }
}

/// Durable keyed storage of pet profiles.
///
/// Implementations must make `update` an atomic read-modify-write for a single key; the
/// session controller relies on that instead of locking on its own.
pub trait ProfileStore: Send + Sync {
    /// Returns the stored profile for `user_key`, if any (clamped).
    fn load(&self, user_key: &str) -> Result<Option<PetProfile>, ProfileError>;

    /// Stores `profile` under `user_key`, replacing any previous value.
    fn put(&self, user_key: &str, profile: &PetProfile) -> Result<(), ProfileError>;

    /// Atomically applies `f` to the current profile (`None` if absent) and stores the result.
    ///
    /// A stored record that cannot be decoded is an error; it is left untouched and `f` is not
    /// applied to defaults in its place.
    fn update(
        &self,
        user_key: &str,
        f: &mut dyn FnMut(Option<PetProfile>) -> PetProfile,
    ) -> Result<PetProfile, ProfileError>;

    /// Profile for `user_key`, or defaults when it is missing or unreadable. Never fails.
    fn get(&self, user_key: &str) -> PetProfile {
        match self.load(user_key) {
            Ok(Some(profile)) => profile,
            Ok(None) => PetProfile::default(),
            Err(e) => {
                tracing::warn!(
                    target: "chatpet::profile",
                    user_key = user_key,
                    error = %e,
                    "Profile read failed; using defaults"
                );
                PetProfile::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_first_run() {
        let p = PetProfile::default();
        assert_eq!(p.pet_type, PetType::Unicorn);
        assert_eq!(p.pet_name, "Daisy");
        assert_eq!(p.pet_level, 1);
        assert_eq!(p.happiness, 100);
    }

    #[test]
    fn decoding_clamps_out_of_range_values() {
        let raw = br#"{"pet_type":"dragon","pet_name":"Ember","pet_level":7,"happiness":250,"last_saved_at_ms":5}"#;
        let p = PetProfile::from_bytes(raw).unwrap();
        assert_eq!(p.pet_type, PetType::Dragon);
        assert_eq!(p.pet_level, 3);
        assert_eq!(p.happiness, 100);

        let raw = br#"{"pet_type":"Unicorn","pet_name":"Daisy","pet_level":0,"happiness":10}"#;
        let p = PetProfile::from_bytes(raw).unwrap();
        assert_eq!(p.pet_level, 1);
        assert_eq!(p.last_saved_at_ms, 0);
    }

    #[test]
    fn decoding_clamps_values_outside_byte_range() {
        let raw = br#"{"pet_type":"Dragon","pet_name":"Ember","pet_level":2,"happiness":300,"last_saved_at_ms":1}"#;
        let p = PetProfile::from_bytes(raw).unwrap();
        assert_eq!(p.pet_type, PetType::Dragon);
        assert_eq!(p.pet_name, "Ember");
        assert_eq!(p.pet_level, 2);
        assert_eq!(p.happiness, 100);

        let raw = br#"{"pet_type":"Dragon","pet_name":"Ember","pet_level":-7,"happiness":-5}"#;
        let p = PetProfile::from_bytes(raw).unwrap();
        assert_eq!(p.pet_level, 1);
        assert_eq!(p.happiness, 0);

        let raw = br#"{"pet_type":"Dragon","pet_name":"Ember","pet_level":1000000,"happiness":42.4}"#;
        let p = PetProfile::from_bytes(raw).unwrap();
        assert_eq!(p.pet_level, 3);
        assert_eq!(p.happiness, 42);
    }

    #[test]
    fn blank_name_falls_back_to_default() {
        let p = PetProfile::new(PetType::Dragon, "   ");
        assert_eq!(p.pet_name, "Daisy");
    }
}
