//! Application configuration
//!
//! Settings come from an optional TOML file and are then overridden by the
//! process environment. The API credential is only ever read from the
//! environment.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [llm]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-3.5-turbo"
//! timeout_secs = 60
//! max_history = 50
//! ```

pub mod prompts;

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use prompts::VOYAGE_ESTIMATOR as SYSTEM_PROMPT;

/// Config file picked up from the working directory when `VOYAGE_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "voyage.toml";

/// Value shipped in `.env.example`; treated the same as a missing key
pub const PLACEHOLDER_API_KEY: &str = "your_openai_api_key_here";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Settings for the completion API the relay talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Bearer credential, from `OPENAI_API_KEY` only
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API (e.g. https://api.openai.com/v1)
    pub base_url: String,

    pub model: String,

    /// Upper bound on generated tokens per reply
    pub max_tokens: u32,

    pub temperature: f32,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// Keep only the most recent N history messages when relaying.
    /// `None` or 0 forwards the whole conversation.
    pub max_history: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            max_tokens: 1500,
            temperature: 0.7,
            timeout_secs: 60,
            max_history: None,
        }
    }
}

impl LlmConfig {
    /// The configured credential, unless it is blank or the placeholder
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != PLACEHOLDER_API_KEY)
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var("VOYAGE_CONFIG") {
            Ok(path) => Self::from_file(&PathBuf::from(path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override settings from `lookup`, which maps variable names to values
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(secs) = lookup("RELAY_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_var("RELAY_TIMEOUT_SECS", &secs)?;
        }
        if let Some(limit) = lookup("RELAY_MAX_HISTORY") {
            // 0 lifts the cap
            let limit: usize = parse_var("RELAY_MAX_HISTORY", &limit)?;
            self.llm.max_history = (limit > 0).then_some(limit);
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}
