//! Configuration loading, validation, and management for ragloom.
//!
//! Loads configuration from `~/.ragloom/config.toml` (or the file named by
//! `RAGLOOM_CONFIG`) with environment variable overrides. Validates all
//! settings at load time.

pub mod logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use logging::init_tracing;

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Chat-completion provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Retrieval query settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Long-document summarization bounds
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum similarity a chunk needs to be returned
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Cap on chunks per source document (unset = service default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunks_per_doc: Option<usize>,
}

fn default_similarity_threshold() -> f64 {
    0.2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_chunks_per_doc: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Maximum tokens per summarized piece
    #[serde(default = "default_chunk_token_limit")]
    pub chunk_token_limit: usize,

    /// Pieces beyond this count are not summarized
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    /// Length of the degraded result when the final pass fails
    #[serde(default = "default_fallback_max_chars")]
    pub fallback_max_chars: usize,

    /// Piece summaries requested in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_chunk_token_limit() -> usize {
    30720
}
fn default_max_chunks() -> usize {
    4
}
fn default_fallback_max_chars() -> usize {
    500
}
fn default_concurrency() -> usize {
    1
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            chunk_token_limit: default_chunk_token_limit(),
            max_chunks: default_max_chunks(),
            fallback_max_chars: default_fallback_max_chars(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `RAGLOOM_CONFIG` or the default path.
    ///
    /// Also checks environment variables:
    /// - `RAGLOOM_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `RAGLOOM_MODEL` overrides the configured model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("RAGLOOM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;

        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("RAGLOOM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("RAGLOOM_MODEL") {
            config.provider.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragloom")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.summary.chunk_token_limit == 0 {
            return Err(ConfigError::ValidationError(
                "summary.chunk_token_limit must be > 0".into(),
            ));
        }

        if self.summary.max_chunks == 0 {
            return Err(ConfigError::ValidationError(
                "summary.max_chunks must be > 0".into(),
            ));
        }

        if self.summary.fallback_max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "summary.fallback_max_chars must be > 0".into(),
            ));
        }

        if self.summary.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "summary.concurrency must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Render the default configuration as TOML.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
