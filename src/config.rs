//! Configuration for the interview relay.
//!
//! Config is loaded from a TOML file with serde defaults, so a missing file
//! or a partial file both yield a runnable configuration. The provider API
//! key is never stored in the file; it is resolved from an environment
//! variable at request time so that a key rotated in the environment takes
//! effect without a restart.

use crate::error::{InterviewError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind (0 = auto-assign).
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8707,
        }
    }
}

/// Hosted model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible provider endpoint.
    pub api_url: String,
    /// Model requested first for every turn.
    pub primary_model: String,
    /// Model tried once when the primary fails with a non-rate-limit error.
    pub fallback_model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Maximum tokens to generate per reply.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f64,
    /// Retry attempts for rate-limit-classified failures.
    pub retry_attempts: u32,
    /// Base delay for the exponential backoff, in milliseconds. The delay
    /// doubles on every attempt.
    pub retry_base_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com".to_owned(),
            primary_model: "gpt-4o-mini".to_owned(),
            fallback_model: "gpt-4.1-mini".to_owned(),
            api_key_env: "INTERVOX_API_KEY".to_owned(),
            max_tokens: 1024,
            temperature: 0.7,
            retry_attempts: 2,
            retry_base_delay_ms: 500,
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key from the configured environment variable.
    ///
    /// Absence (or an all-whitespace value) is a configuration error; the
    /// relay reports it as a 500 at request time rather than refusing to
    /// start, so a key added to the environment is picked up live.
    pub fn resolve_api_key(&self) -> Result<String> {
        let value = std::env::var(&self.api_key_env).map_err(|_| {
            InterviewError::Config(format!("API key env var is not set: {}", self.api_key_env))
        })?;
        if value.trim().is_empty() {
            return Err(InterviewError::Config(format!(
                "API key env var is empty: {}",
                self.api_key_env
            )));
        }
        Ok(value)
    }
}

/// Interview flow configuration.
///
/// The threshold and window were tuned by hand in production; treat them as
/// product knobs, not derived constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewConfig {
    /// Assistant-turn count at which the interview switches to the final
    /// scored report.
    pub question_threshold: usize,
    /// Number of trailing messages forwarded to the provider. Older context
    /// is dropped to stay under provider rate limits.
    pub history_window: usize,
    /// Sentence buffer length (chars) that forces a speech flush when no
    /// terminal punctuation has arrived.
    pub sentence_flush_chars: usize,
    /// Default job track when the client omits one.
    pub default_role: String,
    /// Default difficulty level when the client omits one.
    pub default_level: String,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            question_threshold: 5,
            history_window: 6,
            sentence_flush_chars: 40,
            default_role: "technical".to_owned(),
            default_level: "Junior".to_owned(),
        }
    }
}

/// Client-side history persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Path of the flat JSON history file. Empty = platform data dir.
    pub path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
        }
    }
}

impl HistoryConfig {
    /// Resolve the history file path, defaulting to the platform data dir.
    pub fn resolve_path(&self) -> std::path::PathBuf {
        if !self.path.trim().is_empty() {
            return std::path::PathBuf::from(&self.path);
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("intervox")
            .join("history.json")
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub relay: RelayConfig,
    /// Hosted model provider settings.
    pub provider: ProviderConfig,
    /// Interview flow settings.
    pub interview: InterviewConfig,
    /// History persistence settings.
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            InterviewError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| InterviewError::Config(format!("invalid config {}: {e}", path.display())))
    }
}
