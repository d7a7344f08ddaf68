//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::provider::types::BackendKind;

/// Root configuration for the AI guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Which AI backend to call and how.
    pub provider: ProviderConfig,

    /// Transport timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-session quotas.
    pub rate_limit: RateLimitConfig,

    /// Request signing settings.
    pub signing: SigningConfig,

    /// At-rest secret encryption settings.
    pub encryption: EncryptionConfig,

    /// Durable key/value store location.
    pub store: StoreConfig,

    /// Prompt template.
    pub prompt: PromptConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend wire format to use.
    pub backend: BackendKind,

    /// Model identifier passed to the backend.
    pub model: String,

    /// Override for the backend base URL (e.g., a regional endpoint).
    pub base_url: Option<String>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Refuse plain-HTTP endpoints.
    pub https_only: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.7,
            https_only: true,
        }
    }
}

/// Timeout configuration for backend calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Overall request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            request_secs: 180,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// How long the breaker stays open, in seconds.
    pub open_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_secs: 60,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// API calls allowed per session per window.
    pub api_calls_per_window: u32,

    /// File-processing operations allowed per session per window.
    pub file_ops_per_window: u32,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Minimum time between generation requests, in seconds.
    pub generation_cooldown_secs: u64,

    /// Maximum in-flight requests per session.
    pub max_concurrent: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api_calls_per_window: 20,
            file_ops_per_window: 20,
            window_secs: 3600,
            generation_cooldown_secs: 10,
            max_concurrent: 3,
        }
    }
}

/// Request signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Freshness window for signed requests, in seconds.
    pub replay_window_secs: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            replay_window_secs: 300,
        }
    }
}

/// At-rest encryption configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Identifier of this installation; the PBKDF2 password.
    pub installation_id: String,

    /// Install location mixed into the fallback salt.
    pub install_path: String,

    /// Explicit salt, highest priority.
    pub salt_override: Option<String>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            installation_id: "ai-guard".to_string(),
            install_path: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            salt_override: None,
        }
    }
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("installation_id", &self.installation_id)
            .field("install_path", &self.install_path)
            .field("salt_override", &self.salt_override.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Durable key/value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON settings file.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "ai-guard-settings.json".to_string(),
        }
    }
}

/// Prompt configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PromptConfig {
    /// Custom instruction template; the built-in one is used when absent.
    pub template: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
