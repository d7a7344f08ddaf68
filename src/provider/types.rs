//! Provider-facing value types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{GuardConfig, PromptConfig};
use crate::error::{GuardError, GuardResult};
use crate::secrets::ConfigStore;
use crate::validation::ResponseShape;

/// Which backend wire format to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl BackendKind {
    /// Service name used for breaker records, metrics and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Gemini => "gemini",
            BackendKind::OpenRouter => "openrouter",
        }
    }

    /// Store key holding this backend's API key.
    pub fn api_key_setting(self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai_api_key",
            BackendKind::Gemini => "gemini_api_key",
            BackendKind::OpenRouter => "openrouter_api_key",
        }
    }

    pub fn response_shape(self) -> ResponseShape {
        match self {
            BackendKind::OpenAi => ResponseShape::Responses,
            BackendKind::Gemini => ResponseShape::Candidates,
            BackendKind::OpenRouter => ResponseShape::Choices,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "gemini" => Ok(BackendKind::Gemini),
            "openrouter" => Ok(BackendKind::OpenRouter),
            other => Err(GuardError::Configuration(format!("unknown backend '{}'", other))),
        }
    }
}

/// Requested quiz difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Mixed,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "mixed" => Ok(Difficulty::Mixed),
            other => Err(GuardError::InvalidRequest(format!(
                "difficulty must be one of easy, medium, hard, mixed; got '{}'",
                other
            ))),
        }
    }
}

/// Number of questions to generate, always within `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuestionCount(u32);

impl QuestionCount {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 10;

    pub fn new(count: u32) -> GuardResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&count) {
            Ok(Self(count))
        } else {
            Err(GuardError::InvalidRequest(format!(
                "question count must be between {} and {}; got {}",
                Self::MIN,
                Self::MAX,
                count
            )))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for QuestionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a backend needs to build and send a request.
#[derive(Clone)]
pub struct ProviderSettings {
    pub backend: BackendKind,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub api_key: String,
    /// Secret used for request signatures; falls back to the API key.
    pub signing_secret: Option<String>,
    pub prompt: PromptConfig,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub https_only: bool,
}

impl ProviderSettings {
    /// Combine file configuration with secrets from the store.
    ///
    /// A missing key is left empty here; provider construction rejects it.
    pub fn from_config(config: &GuardConfig, store: &ConfigStore) -> Self {
        let backend = config.provider.backend;
        Self {
            backend,
            model: store
                .get_string("model")
                .unwrap_or_else(|| config.provider.model.clone()),
            base_url: config.provider.base_url.clone(),
            temperature: config.provider.temperature,
            api_key: store.get_string(backend.api_key_setting()).unwrap_or_default(),
            signing_secret: store.get_string("request_signing_secret"),
            prompt: config.prompt.clone(),
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            https_only: config.provider.https_only,
        }
    }

    pub fn signing_secret(&self) -> &str {
        self.signing_secret.as_deref().unwrap_or(&self.api_key)
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("api_key", &"[REDACTED]")
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("https_only", &self.https_only)
            .finish()
    }
}
