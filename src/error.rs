//! Error taxonomy for the guard pipeline.

use std::fmt;
use thiserror::Error;

use crate::security::rate_limit::ResourceKind;

/// A single line-numbered violation of the quiz markdown grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// 1-based line number the violation refers to.
    pub line: usize,
    /// Human readable description.
    pub message: String,
}

impl Violation {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Every violation found in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatViolations(pub Vec<Violation>);

impl fmt::Display for FormatViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}

/// Errors raised anywhere in the guard pipeline.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Missing or invalid credentials, model selection or settings.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller supplied an out-of-range difficulty or question count.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network failure or non-2xx status from the backend.
    #[error("{provider} transport failed{}: {message}", .status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    Transport {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Response did not match the expected wire shape.
    #[error("{provider} response schema error at `{field}`: {reason}")]
    Schema {
        provider: String,
        field: String,
        reason: String,
    },

    /// Dangerous pattern detected in generated text.
    #[error("Content safety check failed: {0}")]
    ContentSafety(String),

    /// Quiz markdown violated the expected grammar.
    #[error("Invalid quiz format: {0}")]
    Format(FormatViolations),

    /// Fixed-window quota exhausted.
    #[error("Quota exceeded for {kind}: limit {limit} per window, resets in {retry_after_secs}s")]
    QuotaExceeded {
        kind: ResourceKind,
        limit: u32,
        retry_after_secs: u64,
    },

    /// Generation requested again before the cooldown elapsed.
    #[error("Cooldown active, retry in {remaining_ms}ms")]
    CooldownActive { remaining_ms: u64 },

    /// Too many in-flight requests for the session.
    #[error("Concurrency limit of {max} in-flight requests reached")]
    ConcurrencyLimitExceeded { max: u32 },

    /// Circuit breaker is open for the service.
    #[error("Service {service} unavailable, retry in {retry_after_secs}s")]
    ServiceUnavailable {
        service: String,
        retry_after_secs: u64,
    },

    /// Authentic signature outside of the replay window.
    #[error("Signature timestamp outside of the {window_secs}s replay window")]
    ReplayWindowExceeded { window_secs: u64 },

    /// Signature did not verify.
    #[error("Signature verification failed")]
    SignatureInvalid,

    /// Persistence failure in the config store.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl GuardError {
    /// Whether the error came from the rate limiter.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            GuardError::QuotaExceeded { .. }
                | GuardError::CooldownActive { .. }
                | GuardError::ConcurrencyLimitExceeded { .. }
        )
    }

    /// Violations carried by a format error.
    pub fn violations(&self) -> Option<&[Violation]> {
        match self {
            GuardError::Format(v) => Some(&v.0),
            _ => None,
        }
    }
}

/// Result type for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;
