//! Engine configuration.
//!
//! Config file: $YLE_PROGRESSION_CONFIG, ~/.config/yle/progression.toml or
//! /etc/yle/progression.toml. Every field is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "YLE_PROGRESSION_CONFIG";

/// Commit behaviour of the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compare-and-set retries after the first attempt before a version
    /// conflict is surfaced; 0 disables retrying
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: u32,
}

fn default_max_commit_retries() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: default_max_commit_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Islands counted for the discovery percentage
    #[serde(default = "default_discoverable_islands")]
    pub discoverable_islands: u32,
}

fn default_discoverable_islands() -> u32 {
    12
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            discoverable_islands: default_discoverable_islands(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Starting ease factor for a card on its first review
    #[serde(default = "default_new_card_ease")]
    pub new_card_ease: f64,
}

fn default_new_card_ease() -> f64 {
    2.5
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            new_card_ease: default_new_card_ease(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing-subscriber filter directive, overridden by RUST_LOG
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressionConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProgressionConfig {
    /// ~/.config/yle/progression.toml
    pub fn user_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("Cannot determine home directory")?;
        Ok(Path::new(&home).join(".config").join("yle").join("progression.toml"))
    }

    pub fn system_config_path() -> PathBuf {
        PathBuf::from("/etc/yle/progression.toml")
    }

    /// Load configuration
    ///
    /// Priority:
    /// 1. $YLE_PROGRESSION_CONFIG
    /// 2. User config (~/.config/yle/progression.toml)
    /// 3. System config (/etc/yle/progression.toml)
    /// 4. Defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        if let Ok(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::load_from(&user_path);
            }
        }

        let system_path = Self::system_config_path();
        if system_path.exists() {
            return Self::load_from(&system_path);
        }

        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ProgressionConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.review.new_card_ease.is_finite() || self.review.new_card_ease <= 0.0 {
            anyhow::bail!("review.new_card_ease must be a positive number");
        }
        Ok(())
    }
}
