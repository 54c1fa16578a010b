//! tagbot/crates/configs/src/lib.rs
//!
//! Process configuration. Sources, lowest precedence first: built-in
//! defaults, an optional `tagbot.toml`, then `TAGBOT__*` environment
//! variables (`TAGBOT__STORAGE__BACKEND=sqlite`). A `.env` file, if present,
//! is loaded into the environment before anything is read.

use std::path::Path;

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_FILE: &str = "tagbot.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Only read by the sqlite backend.
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: "sqlite:tagbot.db".into(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_output_len: usize,
    pub max_depth: usize,
    pub max_nodes: usize,
    pub max_body_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_output_len: 2000, max_depth: 16, max_nodes: 512, max_body_len: 4000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// An `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::Pretty, filter: "info".into() }
    }
}

/// Identity the console transport stamps on every line it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub guild_id: u64,
    pub channel_id: u64,
    pub user_id: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { guild_id: 1, channel_id: 1, user_id: 1 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub command_prefix: String,
    pub tag_prefix: String,
    /// Chat-platform token. Never logged.
    pub token: Option<SecretString>,
    /// Users granted Owner in every guild at startup.
    pub owner_ids: Vec<u64>,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub log: LogConfig,
    pub console: ConsoleConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".into(),
            tag_prefix: "??".into(),
            token: None,
            owner_ids: Vec::new(),
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            log: LogConfig::default(),
            console: ConsoleConfig::default(),
        }
    }
}

impl BotConfig {
    /// Loads `.env`, then `path` (or `tagbot.toml` if it exists), then the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "loaded .env");
        }

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_FILE).required(false),
        };
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("TAGBOT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("owner_ids"),
            )
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let parsed: BotConfig = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("command_prefix must not be empty".into()));
        }
        if self.tag_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("tag_prefix must not be empty".into()));
        }
        if self.command_prefix == self.tag_prefix {
            return Err(ConfigError::Invalid(
                "command_prefix and tag_prefix must differ".into(),
            ));
        }
        if self.storage.timeout_ms == 0 {
            return Err(ConfigError::Invalid("storage.timeout_ms must be positive".into()));
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.url.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.url is required for sqlite".into()));
        }
        let limits = [
            ("limits.max_output_len", self.limits.max_output_len),
            ("limits.max_depth", self.limits.max_depth),
            ("limits.max_nodes", self.limits.max_nodes),
            ("limits.max_body_len", self.limits.max_body_len),
        ];
        if let Some((key, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{key} must be positive")));
        }
        Ok(())
    }
}
