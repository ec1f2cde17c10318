use super::{AssemblerConfig, ConfigError, NormalizerConfig, PacingConfig};
use crate::card::alias::canonical_type;

const MAX_DELAY_MS: u64 = 60 * 60 * 1000;
const MAX_EXPECTED_COUNT: usize = 256;

/// Validate the full configuration, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AssemblerConfig) -> Result<(), ConfigError> {
    validate_pacing(&config.pacing)?;
    validate_normalizer(&config.normalizer)?;
    validate_log_level(&config.log_level)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

/// Validate pacing knobs on their own; used for runtime reconfiguration.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when a knob is out of range.
pub fn validate_pacing(pacing: &PacingConfig) -> Result<(), ConfigError> {
    if pacing.min_chunk_size == 0 {
        return Err(validation_err("pacing.minChunkSize must be greater than 0"));
    }
    if pacing.max_chunk_size < pacing.min_chunk_size {
        return Err(validation_err(format!(
            "pacing.maxChunkSize ({}) must be >= pacing.minChunkSize ({})",
            pacing.max_chunk_size, pacing.min_chunk_size
        )));
    }
    if !pacing.chars_per_token.is_finite() || pacing.chars_per_token <= 0.0 {
        return Err(validation_err(
            "pacing.charsPerToken must be a finite number greater than 0",
        ));
    }
    if !pacing.tokens_per_second.is_finite() || pacing.tokens_per_second <= 0.0 {
        return Err(validation_err(
            "pacing.tokensPerSecond must be a finite number greater than 0",
        ));
    }
    for (name, value) in [
        ("thinkingDelayMs", pacing.thinking_delay_ms),
        ("cardUpdateThrottleMs", pacing.card_update_throttle_ms),
        ("completionBatchDelayMs", pacing.completion_batch_delay_ms),
    ] {
        if value > MAX_DELAY_MS {
            return Err(validation_err(format!(
                "pacing.{name} must not exceed {MAX_DELAY_MS} ms"
            )));
        }
    }
    Ok(())
}

fn validate_normalizer(normalizer: &NormalizerConfig) -> Result<(), ConfigError> {
    for (alias, target) in &normalizer.aliases {
        if alias.trim().is_empty() {
            return Err(validation_err("normalizer.aliases contains an empty alias"));
        }
        if canonical_type(target.trim()).is_none() {
            return Err(validation_err(format!(
                "normalizer.aliases: '{alias}' targets unknown type '{target}'"
            )));
        }
    }
    for (section_type, count) in &normalizer.expected_counts {
        if canonical_type(section_type.trim()).is_none() {
            return Err(validation_err(format!(
                "normalizer.expectedCounts: unknown type '{section_type}'"
            )));
        }
        if *count > MAX_EXPECTED_COUNT {
            return Err(validation_err(format!(
                "normalizer.expectedCounts: '{section_type}' must not exceed {MAX_EXPECTED_COUNT}"
            )));
        }
    }
    Ok(())
}

fn validate_log_level(log_level: &str) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
