//! Pet journal: one diary entry per request, written by the model from the profile and day stats.
//!
//! Runs outside the chat session. A user has at most one entry in flight; a second request while
//! one is generating is refused with [`JournalError::Busy`].

mod book;
mod prompt;

pub use book::JournalBook;
pub use prompt::{build_journal_prompt, JournalStats};

use crate::engine::{InferenceEngine, ModelHandle};
use crate::error::{EngineError, JournalError};
use crate::profile::PetProfile;
use crate::shared::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// A saved diary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub user_key: String,
    /// Local date as written into the prompt, e.g. "March 03, 2025".
    pub date: String,
    /// Local time as written into the prompt, e.g. "09:15 PM".
    pub time: String,
    pub text: String,
    pub created_at_ms: i64,
}

pub struct JournalWriter {
    engine: Arc<dyn InferenceEngine>,
    book: JournalBook,
    model: ModelHandle,
    timeout: Duration,
    busy: Mutex<HashSet<String>>,
}

/// Clears the user's busy mark when the write ends or its future is dropped.
struct BusyMark<'a> {
    busy: &'a Mutex<HashSet<String>>,
    user_key: String,
}

impl Drop for BusyMark<'_> {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_key);
    }
}

impl JournalWriter {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        book: JournalBook,
        model: ModelHandle,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            book,
            model,
            timeout,
            busy: Mutex::new(HashSet::new()),
        }
    }

    pub fn book(&self) -> &JournalBook {
        &self.book
    }

    fn mark_busy(&self, user_key: &str) -> Option<BusyMark<'_>> {
        let inserted = self
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_key.to_string());
        inserted.then(|| BusyMark {
            busy: &self.busy,
            user_key: user_key.to_string(),
        })
    }

    /// Generates and saves today's entry for `user_key`.
    ///
    /// The previous entry (if any) is quoted in the prompt. Nothing is saved unless the model
    /// returns non-blank text.
    pub async fn write_entry(
        &self,
        user_key: &str,
        profile: &PetProfile,
        stats: &JournalStats,
    ) -> Result<JournalEntry, JournalError> {
        let Some(_mark) = self.mark_busy(user_key) else {
            tracing::debug!(target: "chatpet::journal", user_key = user_key, "Journal request refused; one is in flight");
            return Err(JournalError::Busy);
        };

        let previous = self.book.latest_text(user_key)?;
        let now = chrono::Local::now();
        let date = now.format("%B %d, %Y").to_string();
        let time = now.format("%I:%M %p").to_string();
        let prompt = build_journal_prompt(profile, stats, &date, &time, &previous);

        let persona = profile.persona_prompt();
        let call = self.engine.generate(&self.model, &persona, &prompt);
        let text = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.timeout)),
        }
        .map_err(|e| {
            tracing::error!(target: "chatpet::journal", user_key = user_key, error = %e, "Journal generation failed");
            e
        })?;

        if text.trim().is_empty() {
            tracing::warn!(target: "chatpet::journal", user_key = user_key, "Model returned no journal text");
            return Err(JournalError::Empty);
        }

        let entry = JournalEntry {
            entry_id: Uuid::new_v4(),
            user_key: user_key.to_string(),
            date,
            time,
            text,
            created_at_ms: now_ms(),
        };
        self.book.append(&entry)?;
        Ok(entry)
    }
}
