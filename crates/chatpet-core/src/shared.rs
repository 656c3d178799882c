//! Shared types used across all ChatPet crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Pet name used when the user never picked one.
pub const DEFAULT_PET_NAME: &str = "Daisy";

/// Happiness credited for one successful chat turn.
pub const DEFAULT_ENGAGEMENT_DELTA: u8 = 15;

/// Happiness assumed for a user key with no stored profile (first run = full happiness).
pub const DEFAULT_MISSING_HAPPINESS: u8 = 100;

/// Species of a pet. Known kinds get a dedicated persona voice; anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PetType {
    Dragon,
    #[default]
    Unicorn,
    /// Any other user-supplied kind (e.g. "Phoenix"); stored as typed.
    Other(String),
}

impl PetType {
    /// Case-insensitive parse; surrounding whitespace is ignored for the known kinds.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "dragon" => PetType::Dragon,
            "unicorn" => PetType::Unicorn,
            _ => PetType::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PetType::Dragon => "Dragon",
            PetType::Unicorn => "Unicorn",
            PetType::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for PetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for PetType {
    fn from(s: String) -> Self {
        PetType::parse(&s)
    }
}

impl From<PetType> for String {
    fn from(t: PetType) -> Self {
        t.as_str().to_string()
    }
}

/// Current unix time in milliseconds (0 if the clock is before the epoch).
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Global application configuration (gateway + engine + progression). Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity shown in status and startup logs.
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Base directory for Sled DBs (the profile store path is derived from this).
    pub storage_path: String,
    /// Engine mode: "mock" or "local".
    pub llm_mode: String,
    /// Model resource path, passed through unchanged to the engine.
    pub model_path: String,
    /// Base URL of the local model runtime (used in "local" mode).
    pub engine_url: String,
    /// Upper bound for a single generate call.
    pub generate_timeout_secs: u64,
    /// Happiness credited per successful turn.
    #[serde(default = "default_engagement_delta")]
    pub engagement_delta: u8,
    /// Happiness assumed when the user has no stored profile yet.
    #[serde(default = "default_missing_happiness")]
    pub missing_happiness_default: u8,
    /// Max remembered messages for today's conversation context.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Sampling top-k forwarded to the local runtime.
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Browser origins allowed to call the gateway. Empty means the gateway's own localhost origins.
    /// From env: `CHATPET__CORS_ORIGINS=http://localhost:5173,http://127.0.0.1:5173`.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_engagement_delta() -> u8 {
    DEFAULT_ENGAGEMENT_DELTA
}

fn default_missing_happiness() -> u8 {
    DEFAULT_MISSING_HAPPINESS
}

fn default_history_limit() -> usize {
    10
}

fn default_top_k() -> u32 {
    64
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "ChatPet Gateway".to_string(),
            port: 8001,
            storage_path: "./data".to_string(),
            llm_mode: "mock".to_string(),
            model_path: "gemma3-1b-it-int4".to_string(),
            engine_url: "http://127.0.0.1:11434".to_string(),
            generate_timeout_secs: 60,
            engagement_delta: DEFAULT_ENGAGEMENT_DELTA,
            missing_happiness_default: DEFAULT_MISSING_HAPPINESS,
            history_limit: default_history_limit(),
            top_k: default_top_k(),
            cors_origins: Vec::new(),
        }
    }
}

impl CoreConfig {
    /// Generate timeout as a `Duration` (never zero).
    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs.max(1))
    }

    /// Path of the Sled profile DB under `storage_path`.
    pub fn profile_db_path(&self) -> std::path::PathBuf {
        Path::new(&self.storage_path).join("chatpet_profiles")
    }

    /// Load config from file and environment. Precedence: env `CHATPET__*` > `CHATPET_CONFIG` file (or `config/chatpet`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CHATPET_CONFIG").unwrap_or_else(|_| "config/chatpet".to_string());
        let defaults = CoreConfig::default();
        let builder = config::Config::builder()
            .set_default("app_name", defaults.app_name)?
            .set_default("port", defaults.port as i64)?
            .set_default("storage_path", defaults.storage_path)?
            .set_default("llm_mode", defaults.llm_mode)?
            .set_default("model_path", defaults.model_path)?
            .set_default("engine_url", defaults.engine_url)?
            .set_default("generate_timeout_secs", defaults.generate_timeout_secs as i64)?;

        let toml_path = Path::new(&config_path).with_extension("toml");
        let builder = if toml_path.exists() {
            builder.add_source(config::File::from(toml_path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("CHATPET")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .build()?;

        built.try_deserialize()
    }
}
