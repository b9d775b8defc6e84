//! Dotcoin Configuration
//!
//! Handles loading configuration from:
//! 1. DOTCOIN_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.dotcoin/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".dotcoin";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DIFFICULTY: usize = 1;
const DEFAULT_LIMIT: usize = 1024;
const DEFAULT_REWARD: u64 = 100;
const DEFAULT_ROOT_HISTORY: usize = 100;
const DEFAULT_DB_PATH: &str = "./dotcoin-db";

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DotcoinConfig {
    #[serde(default)]
    pub consensus: ConsensusParams,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub prover: ProverConfig,
}

/// Consensus parameters shared by the validator, the wallet and the miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Number of leading '1' characters a block id must carry
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    /// Transactions per block, coinbase included
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Coinbase amount
    #[serde(default = "default_reward")]
    pub reward: u64,
    /// Recent note tree roots accepted by pours
    #[serde(default = "default_root_history")]
    pub root_history: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            limit: DEFAULT_LIMIT,
            reward: DEFAULT_REWARD,
            root_history: DEFAULT_ROOT_HISTORY,
        }
    }
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_reward() -> u64 {
    DEFAULT_REWARD
}

fn default_root_history() -> usize {
    DEFAULT_ROOT_HISTORY
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.into(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.into()
}

/// Pour circuit key material. Without both paths a fresh setup is run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default)]
    pub proving_key_path: Option<String>,
    #[serde(default)]
    pub verifying_key_path: Option<String>,
}

impl ProverConfig {
    pub fn key_paths(&self) -> Option<(&str, &str)> {
        match (&self.proving_key_path, &self.verifying_key_path) {
            (Some(pk), Some(vk)) => Some((pk.as_str(), vk.as_str())),
            _ => None,
        }
    }
}

// ============================================================================
// Override Helpers
// ============================================================================

/// Set field from a variable if present
fn override_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut String) {
    if let Some(v) = lookup(key) {
        *field = v;
    }
}

/// Set Option<String> from a variable if present
fn override_option_string(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut Option<String>,
) {
    if let Some(v) = lookup(key) {
        *field = Some(v);
    }
}

/// Set field from a variable if present and parseable
fn override_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    if let Some(v) = lookup(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {key}={v}"),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl DotcoinConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check DOTCOIN_CONFIG env var
        if let Ok(path) = env::var("DOTCOIN_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("DOTCOIN_CONFIG points at missing file {}", path.display());
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.dotcoin/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from any key/value source
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Consensus
        override_parse(&lookup, "DOTCOIN_DIFFICULTY", &mut self.consensus.difficulty);
        override_parse(&lookup, "DOTCOIN_LIMIT", &mut self.consensus.limit);
        override_parse(&lookup, "DOTCOIN_REWARD", &mut self.consensus.reward);
        override_parse(
            &lookup,
            "DOTCOIN_ROOT_HISTORY",
            &mut self.consensus.root_history,
        );

        // Database
        override_string(&lookup, "DOTCOIN_DB_PATH", &mut self.database.path);

        // Prover
        override_option_string(
            &lookup,
            "DOTCOIN_PROVING_KEY",
            &mut self.prover.proving_key_path,
        );
        override_option_string(
            &lookup,
            "DOTCOIN_VERIFYING_KEY",
            &mut self.prover.verifying_key_path,
        );
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
