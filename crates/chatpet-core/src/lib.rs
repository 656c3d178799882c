//! chatpet-core: pet profiles, persona prompts, progression, the chat session controller and the
//! pet journal.
//!
//! Engine adapters live in `chatpet-engines` and the HTTP surface in the gateway add-on; both
//! depend only on the types re-exported here.

mod engine;
mod error;
mod journal;
mod persona;
mod profile;
mod progression;
mod session;
mod shared;

pub use shared::{
    now_ms, CoreConfig, PetType, DEFAULT_ENGAGEMENT_DELTA, DEFAULT_MISSING_HAPPINESS,
    DEFAULT_PET_NAME,
};

pub use error::{EngineError, JournalError, ProfileError, SubmitRejected};

pub use engine::{InferenceEngine, ModelHandle};

pub use persona::build_persona_prompt;

pub use journal::{
    build_journal_prompt, JournalBook, JournalEntry, JournalStats, JournalWriter,
};

pub use profile::{PetProfile, ProfileStore, SledProfileStore, MAX_HAPPINESS, MAX_LEVEL, MIN_LEVEL};

pub use progression::ProgressionUpdater;

pub use session::{
    ChatSession, ChatTurn, ConversationHistory, HistoryMessage, LlmUiState, SessionConfig,
    SessionContext, Speaker, StateChange, EMPTY_RESPONSE_MESSAGE, EMPTY_RESPONSE_TITLE,
};
