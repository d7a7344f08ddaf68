//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts, quotas and thresholds > 0)
//! - Validate backend base URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::GuardConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check the configuration, collecting every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.provider.model.trim().is_empty() {
        errors.push(ValidationError::new("provider.model", "must not be empty"));
    }
    if let Some(base_url) = &config.provider.base_url {
        match url::Url::parse(base_url) {
            Ok(url) => {
                if config.provider.https_only && url.scheme() != "https" {
                    errors.push(ValidationError::new(
                        "provider.base_url",
                        "must use https when https_only is set",
                    ));
                }
            }
            Err(e) => {
                errors.push(ValidationError::new(
                    "provider.base_url",
                    format!("invalid URL: {}", e),
                ));
            }
        }
    }
    if !(0.0..=2.0).contains(&config.provider.temperature) {
        errors.push(ValidationError::new(
            "provider.temperature",
            "must be between 0.0 and 2.0",
        ));
    }

    let positive = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("circuit_breaker.failure_threshold", config.circuit_breaker.failure_threshold as u64),
        ("circuit_breaker.open_secs", config.circuit_breaker.open_secs),
        ("rate_limit.api_calls_per_window", config.rate_limit.api_calls_per_window as u64),
        ("rate_limit.file_ops_per_window", config.rate_limit.file_ops_per_window as u64),
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("rate_limit.max_concurrent", config.rate_limit.max_concurrent as u64),
        ("signing.replay_window_secs", config.signing.replay_window_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.timeouts.connect_secs > config.timeouts.request_secs {
        errors.push(ValidationError::new(
            "timeouts.connect_secs",
            "must not exceed timeouts.request_secs",
        ));
    }

    if config.encryption.installation_id.trim().is_empty() {
        errors.push(ValidationError::new(
            "encryption.installation_id",
            "must not be empty",
        ));
    }

    if config.store.path.trim().is_empty() {
        errors.push(ValidationError::new("store.path", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
