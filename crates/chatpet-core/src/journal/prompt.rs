//! Diary prompt for the pet's end-of-day journal entry.

use crate::profile::PetProfile;
use serde::{Deserialize, Serialize};

/// Day counters the journal is written from. Happiness and level come from the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalStats {
    pub level_progress: u32,
    pub exp_gained: u32,
    pub energy: u8,
    pub hunger: u8,
    pub times_chatted: u32,
    pub times_fed: u32,
    pub times_tucked_in: u32,
}

/// Builds the diary prompt. Pure: same inputs, same bytes.
///
/// An empty `previous_entry` is written as "None".
pub fn build_journal_prompt(
    profile: &PetProfile,
    stats: &JournalStats,
    date: &str,
    time: &str,
    previous_entry: &str,
) -> String {
    let previous = if previous_entry.trim().is_empty() {
        "None"
    } else {
        previous_entry
    };
    format!(
        "You are a {kind} named {name} at level {level}, level progress {progress}, \
         today's level experience gained {exp}. Today is {date}, time is {time}, \
         and this was your previous journal entry {previous}.\n\
         Write a diary entry about your day.\n\
         Today's Stats:\n\
         - Happiness: {happiness}/100\n\
         - Energy: {energy}/100\n\
         - Hunger: {hunger}/100\n\
         - Times chatted: {chatted}\n\
         - Times fed: {fed}\n\
         - Times tucked in: {tucked}\n\
         Write a journal entry from the pet's perspective about the day based on the information above:\n\
         Level 1 = infant\n\
         Level 2 = teen\n\
         Level 3 = adult.\n\
         Exclude any other statements than your current role as this pet, such as Okay here is your journal.\n\
         Don't start the journal with Okay.",
        kind = profile.pet_type,
        name = profile.pet_name,
        level = profile.pet_level,
        progress = stats.level_progress,
        exp = stats.exp_gained,
        happiness = profile.happiness,
        energy = stats.energy.min(100),
        hunger = stats.hunger.min(100),
        chatted = stats.times_chatted,
        fed = stats.times_fed,
        tucked = stats.times_tucked_in,
    )
}
