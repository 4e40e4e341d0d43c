//! Server settings, read from an optional TOML file and overridden by CLI flags.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Authenticated players allowed at once.
    pub max_players: usize,
    pub max_lobbies: usize,
    pub max_lobby_members: usize,
    /// Gold a player needs to win a round.
    pub gold_goal: u32,
    pub starting_lives: u8,
    /// Finished rounds kept for GET_HISTORY.
    pub history_len: usize,
    /// Drop connections silent for this long. 0 disables the check.
    pub idle_timeout_secs: u64,
    /// Fixed seed for map seeds and loot rolls, random when unset.
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_players: 64,
            max_lobbies: 16,
            max_lobby_members: 7,
            gold_goal: 3000,
            starting_lives: 2,
            history_len: 20,
            idle_timeout_secs: 0,
            rng_seed: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.max_lobby_members == 0 {
            return Err(ConfigError::Invalid("max_lobby_members must be positive".into()));
        }
        if self.starting_lives == 0 || self.starting_lives > shared::MAX_LIVES {
            return Err(ConfigError::Invalid(format!(
                "starting_lives must be between 1 and {}",
                shared::MAX_LIVES
            )));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}
