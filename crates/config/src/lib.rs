//! Configuration for the Perceptor pipeline.
//!
//! One TOML file at `~/.perceptor/config.toml`, a handful of env
//! overrides on top, and validation before anything else runs. Every
//! field has a serde default, so a missing file and a partial file both
//! work.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root of the config file.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The user whose timeline this instance tracks
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Model used for profile synthesis
    #[serde(default = "default_model")]
    pub model: String,

    /// Output-token cap per synthesis call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (forced to 1.0 when reasoning is active)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Ingestion API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

fn default_user_id() -> String {
    "default".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_temperature() -> f32 {
    1.0
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("user_id", &self.user_id)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("store", &self.store)
            .field("provider", &self.provider)
            .field("synthesis", &self.synthesis)
            .field("api", &self.api)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Override the sqlite database path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Anthropic API key; falls back to env vars when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the API endpoint (proxies, test servers)
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
        }
    }
}

// Keys must never leak through logs; Debug shows presence only.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Whether to enable extended reasoning during synthesis
    #[serde(default = "default_true")]
    pub reasoning: bool,

    /// Reasoning token budget when enabled
    #[serde(default = "default_reasoning_budget")]
    pub reasoning_budget: u32,
}

fn default_reasoning_budget() -> u32 {
    16_000
}
fn default_true() -> bool {
    true
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            reasoning: true,
            reasoning_budget: default_reasoning_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    7317
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.perceptor/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PERCEPTOR_API_KEY` (highest priority), then `ANTHROPIC_API_KEY`
    /// - `PERCEPTOR_MODEL`
    /// - `PERCEPTOR_USER`
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply environment overrides through the supplied lookup. A key in
    /// the config file wins over the environment; model and user come from
    /// the environment whenever set.
    fn apply_env_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key =
                get("PERCEPTOR_API_KEY").or_else(|| get("ANTHROPIC_API_KEY"));
        }

        if let Some(model) = get("PERCEPTOR_MODEL") {
            self.model = model;
        }

        if let Some(user) = get("PERCEPTOR_USER") {
            self.user_id = user;
        }
    }

    /// Load from an explicit file path. A missing file is not an error;
    /// it yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Directory holding config.toml and the default sqlite file.
    pub fn config_dir() -> PathBuf {
        home_dir().join(".perceptor")
    }

    /// Resolve the sqlite database path.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("perceptor.db"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::Invalid("user_id must not be empty".into()));
        }

        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::Invalid(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.synthesis.reasoning && self.synthesis.reasoning_budget < 1024 {
            return Err(ConfigError::Invalid(
                "reasoning_budget must be at least 1024 tokens".into(),
            ));
        }

        match self.store.backend.as_str() {
            "sqlite" | "memory" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown store backend '{other}' (expected sqlite or memory)"
                )));
            }
        }

        Ok(())
    }

    /// True once a key arrived from the file or the environment.
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Render the defaults as TOML for first-run setup.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            store: StoreConfig::default(),
            provider: ProviderConfig::default(),
            synthesis: SynthesisConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";

    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Config at {path} is not valid TOML: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
