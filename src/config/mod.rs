pub mod validation;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use self::validation::{validate_config, validate_pacing};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pacing knobs. Every knob is named; nothing is derived implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingConfig {
    /// Smallest number of characters released per tick.
    #[serde(default = "default_min_chunk_size", alias = "min_chunk_size")]
    pub min_chunk_size: usize,
    /// Largest number of characters released per tick.
    #[serde(default = "default_max_chunk_size", alias = "max_chunk_size")]
    pub max_chunk_size: usize,
    /// Pause between `start` and the first tick.
    #[serde(default = "default_thinking_delay_ms", alias = "thinking_delay_ms")]
    pub thinking_delay_ms: u64,
    #[serde(default = "default_chars_per_token", alias = "chars_per_token")]
    pub chars_per_token: f64,
    #[serde(default = "default_tokens_per_second", alias = "tokens_per_second")]
    pub tokens_per_second: f64,
    /// Minimum spacing between two emitted card snapshots.
    #[serde(
        default = "default_card_update_throttle_ms",
        alias = "card_update_throttle_ms"
    )]
    pub card_update_throttle_ms: u64,
    /// How long newly completed sections are held so that completions landing
    /// close together go out in one snapshot.
    #[serde(
        default = "default_completion_batch_delay_ms",
        alias = "completion_batch_delay_ms"
    )]
    pub completion_batch_delay_ms: u64,
}

fn default_min_chunk_size() -> usize {
    3
}
fn default_max_chunk_size() -> usize {
    12
}
fn default_thinking_delay_ms() -> u64 {
    600
}
fn default_chars_per_token() -> f64 {
    4.0
}
fn default_tokens_per_second() -> f64 {
    40.0
}
fn default_card_update_throttle_ms() -> u64 {
    50
}
fn default_completion_batch_delay_ms() -> u64 {
    120
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            thinking_delay_ms: default_thinking_delay_ms(),
            chars_per_token: default_chars_per_token(),
            tokens_per_second: default_tokens_per_second(),
            card_update_throttle_ms: default_card_update_throttle_ms(),
            completion_batch_delay_ms: default_completion_batch_delay_ms(),
        }
    }
}

impl PacingConfig {
    /// Characters released per second of simulated generation.
    #[must_use]
    pub fn chars_per_second(&self) -> f64 {
        self.chars_per_token * self.tokens_per_second
    }

    #[must_use]
    pub fn thinking_delay(&self) -> Duration {
        Duration::from_millis(self.thinking_delay_ms)
    }

    #[must_use]
    pub fn card_update_throttle(&self) -> Duration {
        Duration::from_millis(self.card_update_throttle_ms)
    }

    #[must_use]
    pub fn completion_batch_delay(&self) -> Duration {
        Duration::from_millis(self.completion_batch_delay_ms)
    }

    /// Layer `overrides` over `self`, validating the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the merged configuration is
    /// invalid; `self` is left untouched.
    pub fn apply(&self, overrides: &PacingOverrides) -> Result<Self, ConfigError> {
        let merged = Self {
            min_chunk_size: overrides.min_chunk_size.unwrap_or(self.min_chunk_size),
            max_chunk_size: overrides.max_chunk_size.unwrap_or(self.max_chunk_size),
            thinking_delay_ms: overrides
                .thinking_delay_ms
                .unwrap_or(self.thinking_delay_ms),
            chars_per_token: overrides.chars_per_token.unwrap_or(self.chars_per_token),
            tokens_per_second: overrides
                .tokens_per_second
                .unwrap_or(self.tokens_per_second),
            card_update_throttle_ms: overrides
                .card_update_throttle_ms
                .unwrap_or(self.card_update_throttle_ms),
            completion_batch_delay_ms: overrides
                .completion_batch_delay_ms
                .unwrap_or(self.completion_batch_delay_ms),
        };
        validate_pacing(&merged)?;
        Ok(merged)
    }
}

/// Partial pacing update; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingOverrides {
    #[serde(default, alias = "min_chunk_size")]
    pub min_chunk_size: Option<usize>,
    #[serde(default, alias = "max_chunk_size")]
    pub max_chunk_size: Option<usize>,
    #[serde(default, alias = "thinking_delay_ms")]
    pub thinking_delay_ms: Option<u64>,
    #[serde(default, alias = "chars_per_token")]
    pub chars_per_token: Option<f64>,
    #[serde(default, alias = "tokens_per_second")]
    pub tokens_per_second: Option<f64>,
    #[serde(default, alias = "card_update_throttle_ms")]
    pub card_update_throttle_ms: Option<u64>,
    #[serde(default, alias = "completion_batch_delay_ms")]
    pub completion_batch_delay_ms: Option<u64>,
}

impl PacingOverrides {
    /// Parse overrides from a JSON object such as `{"minChunkSize": 4}`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed input, including negative
    /// delays.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Normalizer settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizerConfig {
    /// Alias → canonical type entries layered over the builtin table.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Canonical type → number of fields/items to sketch as placeholders
    /// before real entries arrive.
    #[serde(default, alias = "expected_counts")]
    pub expected_counts: BTreeMap<String, usize>,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblerConfig {
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default = "default_log_level", alias = "log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            normalizer: NormalizerConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AssemblerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Validation`].
pub fn parse_config(contents: &str) -> Result<AssemblerConfig, ConfigError> {
    let config: AssemblerConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
