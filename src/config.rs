//! TOML configuration.
//!
//! ```toml
//! [provider]
//! endpoint = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! # api_key = "sk-..."   # falls back to OPENAI_API_KEY
//! timeout_secs = 60
//! temperature = 0.2
//!
//! [logs]
//! root = "./logs"
//!
//! [chunking]
//! max_chars = 12000
//! ```
//!
//! Every section and key is optional.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{DigestError, DigestResult};

/// Environment variable consulted when `provider.api_key` is unset.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

// Hand-written so the credential never lands in logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    #[serde(default = "default_logs_root")]
    pub root: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            root: default_logs_root(),
        }
    }
}

fn default_logs_root() -> PathBuf {
    PathBuf::from("./logs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    12_000
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// The logs root for a run: the per-call override when given, else the
    /// configured default.
    pub fn logs_root(&self, override_root: Option<&Path>) -> PathBuf {
        override_root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.logs.root.clone())
    }
}

impl ProviderConfig {
    /// Resolve the bearer credential: config first, then [`API_KEY_ENV`].
    pub fn resolve_api_key(&self) -> DigestResult<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(API_KEY_ENV)
                    .ok()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
            })
            .ok_or(DigestError::CredentialMissing)
    }
}

/// Parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.provider.endpoint.trim().is_empty() {
        bail!("provider.endpoint must not be empty");
    }
    if config.provider.model.trim().is_empty() {
        bail!("provider.model must not be empty");
    }
    if config.provider.timeout_secs == 0 {
        bail!("provider.timeout_secs must be > 0");
    }
    if !(0.0..=2.0).contains(&config.provider.temperature) {
        bail!("provider.temperature must be in [0.0, 2.0]");
    }
    Ok(())
}
